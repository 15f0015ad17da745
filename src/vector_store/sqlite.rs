//! SQLite-based vector store implementation.
//!
//! Embeddings are stored as little-endian BLOBs and cosine similarity is
//! computed in Rust after the SQL filters have narrowed the candidate set.

use super::{
    closest_title, cosine_similarity, match_title, no_course_error, rank_chunks, SearchResults,
    VectorStore,
};
use crate::course::{Course, CourseChunk, Lesson};
use crate::embedding::Embedder;
use crate::error::{LektorError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS courses (
        title TEXT PRIMARY KEY,
        instructor TEXT,
        link TEXT,
        lessons_json TEXT NOT NULL,
        embedding BLOB NOT NULL,
        added_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        id TEXT PRIMARY KEY,
        course_title TEXT NOT NULL,
        lesson_number INTEGER,
        chunk_index INTEGER NOT NULL,
        content TEXT NOT NULL,
        embedding BLOB NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_course ON chunks(course_title, lesson_number);
"#;

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
    max_results: usize,
}

impl SqliteVectorStore {
    /// Open (or create) a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path, embedder: Arc<dyn Embedder>, max_results: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite vector store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
            max_results,
        })
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory(embedder: Arc<dyn Embedder>, max_results: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
            max_results,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| LektorError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn load_courses(conn: &Connection) -> Result<Vec<(Course, Vec<f32>)>> {
        let mut stmt = conn.prepare(
            "SELECT title, instructor, link, lessons_json, embedding FROM courses ORDER BY added_at",
        )?;

        let rows = stmt.query_map([], |row| {
            let lessons_json: String = row.get(3)?;
            let embedding: Vec<u8> = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                lessons_json,
                embedding,
            ))
        })?;

        let mut courses = Vec::new();
        for row in rows {
            let (title, instructor, link, lessons_json, embedding) = row?;
            let lessons: Vec<Lesson> = serde_json::from_str(&lessons_json)?;
            courses.push((
                Course {
                    title,
                    instructor,
                    link,
                    lessons,
                },
                Self::bytes_to_embedding(&embedding),
            ));
        }
        Ok(courses)
    }

    /// Resolve a fuzzy course name, embedding it only when no title matches by text.
    async fn resolve_course(&self, name: &str) -> Result<Option<String>> {
        let courses = {
            let conn = self.lock()?;
            Self::load_courses(&conn)?
        };

        if courses.is_empty() {
            return Ok(None);
        }
        if let Some(title) = match_title(name, courses.iter().map(|(c, _)| c.title.as_str())) {
            return Ok(Some(title));
        }

        let name_embedding = self.embedder.embed(name).await?;
        Ok(closest_title(
            &name_embedding,
            courses.iter().map(|(c, e)| (c.title.as_str(), e.as_slice())),
        ))
    }

    async fn try_search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> Result<SearchResults> {
        let course_title = match course_name {
            Some(name) => match self.resolve_course(name).await? {
                Some(title) => Some(title),
                None => return Ok(SearchResults::from_error(no_course_error(name))),
            },
            None => None,
        };

        let query_embedding = self.embedder.embed(query).await?;

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT course_title, lesson_number, chunk_index, content, embedding
            FROM chunks
            WHERE (?1 IS NULL OR course_title = ?1)
              AND (?2 IS NULL OR lesson_number = ?2)
            "#,
        )?;

        let rows = stmt.query_map(params![course_title, lesson_number], |row| {
            let embedding: Vec<u8> = row.get(4)?;
            Ok((
                CourseChunk {
                    course_title: row.get(0)?,
                    lesson_number: row.get(1)?,
                    chunk_index: row.get(2)?,
                    content: row.get(3)?,
                },
                Self::bytes_to_embedding(&embedding),
            ))
        })?;

        let mut scored = Vec::new();
        for row in rows {
            let (chunk, embedding) = row?;
            let score = cosine_similarity(&query_embedding, &embedding);
            scored.push((chunk, score));
        }

        let ranked = rank_chunks(scored, self.max_results);
        let courses: Vec<Course> = Self::load_courses(&conn)?
            .into_iter()
            .map(|(c, _)| c)
            .collect();

        Ok(SearchResults::from_ranked(ranked, &courses))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> SearchResults {
        match self.try_search(query, course_name, lesson_number).await {
            Ok(results) => {
                debug!("Found {} matching passages", results.len());
                results
            }
            Err(e) => {
                warn!("Search failed: {}", e);
                SearchResults::from_error(format!("Search error: {}", e))
            }
        }
    }

    #[instrument(skip(self))]
    async fn course_outline(&self, course_name: &str) -> Result<Option<Course>> {
        let Some(title) = self.resolve_course(course_name).await? else {
            return Ok(None);
        };

        let conn = self.lock()?;
        Ok(Self::load_courses(&conn)?
            .into_iter()
            .map(|(c, _)| c)
            .find(|c| c.title == title))
    }

    #[instrument(skip(self, course), fields(title = %course.title))]
    async fn add_course(&self, course: &Course) -> Result<()> {
        let embedding = self.embedder.embed(&course.title).await?;
        let lessons_json = serde_json::to_string(&course.lessons)?;

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO courses (title, instructor, link, lessons_json, embedding, added_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                course.title,
                course.instructor,
                course.link,
                lessons_json,
                Self::embedding_to_bytes(&embedding),
                Utc::now().to_rfc3339(),
            ],
        )?;

        debug!("Stored course metadata");
        Ok(())
    }

    #[instrument(skip(self, chunks))]
    async fn add_chunks(&self, chunks: &[CourseChunk]) -> Result<usize> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        for (chunk, embedding) in chunks.iter().zip(&embeddings) {
            tx.execute(
                r#"
                INSERT INTO chunks (id, course_title, lesson_number, chunk_index, content, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    uuid::Uuid::new_v4().to_string(),
                    chunk.course_title,
                    chunk.lesson_number,
                    chunk.chunk_index,
                    chunk.content,
                    Self::embedding_to_bytes(embedding),
                ],
            )?;
        }

        tx.commit()?;
        info!("Stored {} passages", chunks.len());
        Ok(chunks.len())
    }

    async fn course_titles(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT title FROM courses ORDER BY added_at")?;
        let titles = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(titles)
    }

    async fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM chunks; DELETE FROM courses;")?;
        info!("Cleared vector store");
        Ok(())
    }

    async fn course_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM courses", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
