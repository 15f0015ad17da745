//! Retrieval provider for course material.
//!
//! Stores course metadata and embedded passages, resolves fuzzy course names
//! and answers filtered similarity searches.

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::config::{Settings, VectorStoreSettings};
use crate::course::{Course, CourseChunk};
use crate::embedding::Embedder;
use crate::error::{LektorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Course and lesson a retrieved passage belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub course_title: String,
    pub lesson_number: Option<u32>,
}

/// Outcome of a search, ordered by descending relevance.
///
/// `documents`, `metadata` and `distances` are parallel. A backend failure is
/// reported through `error` with all other fields empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub documents: Vec<String>,
    pub metadata: Vec<ChunkMetadata>,
    pub distances: Vec<f32>,
    pub lesson_links: HashMap<(String, u32), String>,
    pub error: Option<String>,
}

impl SearchResults {
    /// Results carrying only an error message.
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Build results from chunks ranked by similarity, best first.
    pub fn from_ranked(ranked: Vec<(CourseChunk, f32)>, courses: &[Course]) -> Self {
        let mut results = Self::default();

        for (chunk, score) in ranked {
            if let Some(number) = chunk.lesson_number {
                let link = courses
                    .iter()
                    .find(|c| c.title == chunk.course_title)
                    .and_then(|c| c.lesson_link(number));
                if let Some(link) = link {
                    results
                        .lesson_links
                        .insert((chunk.course_title.clone(), number), link.to_string());
                }
            }

            results.documents.push(chunk.content);
            results.metadata.push(ChunkMetadata {
                course_title: chunk.course_title,
                lesson_number: chunk.lesson_number,
            });
            results.distances.push(1.0 - score);
        }

        results
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Deep link for a course/lesson pair, if the provider knows one.
    pub fn lesson_link(&self, course_title: &str, lesson_number: u32) -> Option<&str> {
        self.lesson_links
            .get(&(course_title.to_string(), lesson_number))
            .map(String::as_str)
    }
}

/// Backend that stores courses and answers searches over their content.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Search passages, optionally restricted to a course (fuzzy name) and lesson.
    ///
    /// Failures are folded into [`SearchResults::error`].
    async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
    ) -> SearchResults;

    /// Look up a course by fuzzy name.
    async fn course_outline(&self, course_name: &str) -> Result<Option<Course>>;

    /// Store or replace a course's metadata.
    async fn add_course(&self, course: &Course) -> Result<()>;

    /// Embed and store passages.
    async fn add_chunks(&self, chunks: &[CourseChunk]) -> Result<usize>;

    /// Titles of every stored course.
    async fn course_titles(&self) -> Result<Vec<String>>;

    /// Remove all courses and passages.
    async fn clear(&self) -> Result<()>;

    /// Number of stored courses.
    async fn course_count(&self) -> Result<usize> {
        Ok(self.course_titles().await?.len())
    }
}

/// Open the store named by `settings.provider`.
pub fn open_store(
    settings: &VectorStoreSettings,
    embedder: Arc<dyn Embedder>,
) -> Result<Arc<dyn VectorStore>> {
    match settings.provider.as_str() {
        "sqlite" => Ok(Arc::new(SqliteVectorStore::new(
            &Settings::expand_path(&settings.sqlite_path),
            embedder,
            settings.max_results,
        )?)),
        "memory" => Ok(Arc::new(MemoryVectorStore::new(
            embedder,
            settings.max_results,
        ))),
        other => Err(LektorError::Config(format!(
            "Unknown vector store provider: {}",
            other
        ))),
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Match a user-supplied course name against stored titles by text.
///
/// Exact (case-insensitive) match wins, then the first title containing the name.
pub(crate) fn match_title<'a>(
    name: &str,
    titles: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let needle = name.trim().to_lowercase();
    let titles: Vec<&str> = titles.into_iter().collect();

    if let Some(title) = titles.iter().find(|t| t.to_lowercase() == needle) {
        return Some(title.to_string());
    }

    if needle.is_empty() {
        return None;
    }

    titles
        .iter()
        .find(|t| t.to_lowercase().contains(&needle))
        .map(|t| t.to_string())
}

/// Title whose embedding is most similar to the name's, if any shares similarity.
pub(crate) fn closest_title<'a>(
    name_embedding: &[f32],
    titles: impl IntoIterator<Item = (&'a str, &'a [f32])>,
) -> Option<String> {
    titles
        .into_iter()
        .map(|(title, embedding)| (title, cosine_similarity(name_embedding, embedding)))
        .filter(|(_, score)| *score > 0.0)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(title, _)| title.to_string())
}

/// Keep the `limit` best-scoring chunks, best first.
pub(crate) fn rank_chunks(mut scored: Vec<(CourseChunk, f32)>, limit: usize) -> Vec<(CourseChunk, f32)> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

/// Message used when a course filter matches no stored course.
pub(crate) fn no_course_error(name: &str) -> String {
    format!("No course found matching '{}'", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::Lesson;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert!((cosine_similarity(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[test]
    fn test_match_title_prefers_exact_then_substring() {
        let titles = [
            "Building Towards Computer Use",
            "MCP: Build Rich-Context AI Apps",
        ];

        assert_eq!(
            match_title("mcp: build rich-context ai apps", titles),
            Some("MCP: Build Rich-Context AI Apps".to_string())
        );
        assert_eq!(
            match_title("Computer Use", titles),
            Some("Building Towards Computer Use".to_string())
        );
        assert_eq!(match_title("  ", titles), None);
        assert_eq!(match_title("Rust", titles), None);
    }

    #[test]
    fn test_closest_title_by_similarity() {
        let titles: [(&str, &[f32]); 2] = [("Alpha", &[1.0, 0.0]), ("Beta", &[0.0, 1.0])];
        assert_eq!(closest_title(&[0.1, 0.9], titles), Some("Beta".to_string()));
        assert_eq!(closest_title(&[0.0, 0.0], titles), None);
    }

    #[test]
    fn test_from_ranked_attaches_links() {
        let course = Course {
            title: "ML".to_string(),
            instructor: None,
            link: None,
            lessons: vec![Lesson {
                number: 1,
                title: "Intro".to_string(),
                link: Some("http://example.com/1".to_string()),
            }],
        };
        let chunk = |lesson| CourseChunk {
            course_title: "ML".to_string(),
            lesson_number: lesson,
            chunk_index: 0,
            content: "text".to_string(),
        };

        let results = SearchResults::from_ranked(
            vec![(chunk(Some(1)), 0.9), (chunk(Some(2)), 0.5), (chunk(None), 0.1)],
            &[course],
        );

        assert_eq!(results.len(), 3);
        assert_eq!(results.lesson_link("ML", 1), Some("http://example.com/1"));
        assert_eq!(results.lesson_link("ML", 2), None);
        assert!((results.distances[0] - 0.1).abs() < 0.001);
    }

    #[test]
    fn test_open_store_rejects_unknown_provider() {
        let settings = VectorStoreSettings {
            provider: "pinecone".to_string(),
            ..VectorStoreSettings::default()
        };
        let embedder = Arc::new(crate::testing::HashEmbedder::default());
        assert!(matches!(
            open_store(&settings, embedder),
            Err(LektorError::Config(_))
        ));
    }
}
