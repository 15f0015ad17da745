//! In-memory vector store.
//!
//! Useful for testing and small course sets.

use super::{
    closest_title, cosine_similarity, match_title, no_course_error, rank_chunks, SearchResults,
    VectorStore,
};
use crate::course::{Course, CourseChunk};
use crate::embedding::Embedder;
use crate::error::{LektorError, Result};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tracing::{debug, instrument, warn};

struct StoredCourse {
    course: Course,
    embedding: Vec<f32>,
}

struct StoredChunk {
    chunk: CourseChunk,
    embedding: Vec<f32>,
}

/// In-memory vector store.
pub struct MemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    max_results: usize,
    courses: RwLock<Vec<StoredCourse>>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl MemoryVectorStore {
    /// Create an empty store returning at most `max_results` passages per search.
    pub fn new(embedder: Arc<dyn Embedder>, max_results: usize) -> Self {
        Self {
            embedder,
            max_results,
            courses: RwLock::new(Vec::new()),
            chunks: RwLock::new(Vec::new()),
        }
    }

    fn lock_error<E: std::fmt::Display>(e: E) -> LektorError {
        LektorError::VectorStore(format!("Failed to acquire lock: {}", e))
    }

    /// Resolve a fuzzy course name, embedding it only when no title matches by text.
    async fn resolve_course(&self, name: &str) -> Result<Option<String>> {
        {
            let courses = self.courses.read().map_err(Self::lock_error)?;
            if courses.is_empty() {
                return Ok(None);
            }
            if let Some(title) = match_title(name, courses.iter().map(|c| c.course.title.as_str())) {
                return Ok(Some(title));
            }
        }

        let name_embedding = self.embedder.embed(name).await?;
        let courses = self.courses.read().map_err(Self::lock_error)?;
        Ok(closest_title(
            &name_embedding,
            courses
                .iter()
                .map(|c| (c.course.title.as_str(), c.embedding.as_slice())),
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

        let ranked = {
            let chunks = self.chunks.read().map_err(Self::lock_error)?;
            let scored = chunks
                .iter()
                .filter(|c| {
                    course_title
                        .as_ref()
                        .map_or(true, |t| &c.chunk.course_title == t)
                })
                .filter(|c| lesson_number.is_none() || c.chunk.lesson_number == lesson_number)
                .map(|c| (c.chunk.clone(), cosine_similarity(&query_embedding, &c.embedding)))
                .collect();
            rank_chunks(scored, self.max_results)
        };

        let courses = self.courses.read().map_err(Self::lock_error)?;
        let course_list: Vec<Course> = courses.iter().map(|c| c.course.clone()).collect();
        Ok(SearchResults::from_ranked(ranked, &course_list))
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    #[instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> SearchResults {
        match self.try_search(query, course_name, lesson_number).await {
            Ok(results) => {
                debug!("Search returned {} passages", results.len());
                results
            }
            Err(e) => {
                warn!("Search failed: {}", e);
                SearchResults::from_error(format!("Search error: {}", e))
            }
        }
    }

    async fn course_outline(&self, course_name: &str) -> Result<Option<Course>> {
        let Some(title) = self.resolve_course(course_name).await? else {
            return Ok(None);
        };

        let courses = self.courses.read().map_err(Self::lock_error)?;
        Ok(courses
            .iter()
            .find(|c| c.course.title == title)
            .map(|c| c.course.clone()))
    }

    async fn add_course(&self, course: &Course) -> Result<()> {
        let embedding = self.embedder.embed(&course.title).await?;
        let mut courses = self.courses.write().map_err(Self::lock_error)?;

        let stored = StoredCourse {
            course: course.clone(),
            embedding,
        };
        match courses.iter_mut().find(|c| c.course.title == course.title) {
            Some(existing) => *existing = stored,
            None => courses.push(stored),
        }
        Ok(())
    }

    async fn add_chunks(&self, chunks: &[CourseChunk]) -> Result<usize> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let mut store = self.chunks.write().map_err(Self::lock_error)?;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            store.push(StoredChunk {
                chunk: chunk.clone(),
                embedding,
            });
        }
        Ok(chunks.len())
    }

    async fn course_titles(&self) -> Result<Vec<String>> {
        let courses = self.courses.read().map_err(Self::lock_error)?;
        Ok(courses.iter().map(|c| c.course.title.clone()).collect())
    }

    async fn clear(&self) -> Result<()> {
        self.courses.write().map_err(Self::lock_error)?.clear();
        self.chunks.write().map_err(Self::lock_error)?.clear();
        Ok(())
    }
}
