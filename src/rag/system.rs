//! Wiring of store, tools, model and sessions behind a single `query` call.

use super::session::SessionManager;
use super::{CourseAnalytics, RagResponse};
use crate::agent::{
    CourseOutlineTool, CourseSearchTool, ResponseGenerator, ToolDefinition, ToolRegistry,
};
use crate::config::{Prompts, Settings};
use crate::course::{course_files_in, load_course_file, Course};
use crate::embedding::OpenAIEmbedder;
use crate::error::Result;
use crate::llm::{AnthropicClient, LlmClient};
use crate::vector_store::{open_store, VectorStore};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Course question answering over a store of ingested courses.
pub struct RagSystem {
    store: Arc<dyn VectorStore>,
    registry: ToolRegistry,
    tool_definitions: Vec<ToolDefinition>,
    generator: ResponseGenerator,
    prompts: Prompts,
    sessions: SessionManager,
    max_rounds: usize,
}

impl RagSystem {
    /// Build the system from settings, connecting to the configured services.
    pub fn new(settings: &Settings) -> Result<Self> {
        let embedder = Arc::new(OpenAIEmbedder::from_settings(&settings.embedding)?);
        let store = open_store(&settings.vector_store, embedder)?;
        let client = Arc::new(AnthropicClient::new(&settings.llm)?);
        let prompts = Prompts::load(settings.prompts.custom_dir.as_deref())?;

        Ok(Self::with_components(settings, client, store, prompts))
    }

    /// Build the system around an existing model client and store.
    pub fn with_components(
        settings: &Settings,
        client: Arc<dyn LlmClient>,
        store: Arc<dyn VectorStore>,
        prompts: Prompts,
    ) -> Self {
        let mut registry = ToolRegistry::new();
        for tool in [
            Arc::new(CourseSearchTool::new(store.clone())) as Arc<dyn crate::agent::Tool>,
            Arc::new(CourseOutlineTool::new(store.clone())),
        ] {
            if let Some(previous) = registry.register(tool) {
                warn!("Tool '{}' was replaced during setup", previous.name);
            }
        }

        let generator =
            ResponseGenerator::from_settings(client, &prompts.system.instructions, &settings.llm);

        Self {
            store,
            tool_definitions: registry.definitions(),
            registry,
            generator,
            prompts,
            sessions: SessionManager::new(settings.session.max_history),
            max_rounds: settings.llm.max_rounds,
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Answer a question, continuing `session_id` or starting a new session.
    #[instrument(skip(self, question))]
    pub async fn query(&self, question: &str, session_id: Option<&str>) -> Result<RagResponse> {
        let session_id = match session_id {
            Some(id) => id.to_string(),
            None => self.sessions.create_session()?,
        };

        let history = self.sessions.history(&session_id)?;
        let prompt = self.prompts.render_query(question);

        let answer = self
            .generator
            .generate(
                &prompt,
                history.as_deref(),
                Some(self.tool_definitions.as_slice()),
                Some(&self.registry),
                self.max_rounds,
            )
            .await;

        self.sessions
            .add_exchange(&session_id, question, &answer.text)?;

        info!(
            "Answered with {} source(s) in {} LLM call(s)",
            answer.citations.len(),
            answer.llm_calls
        );

        Ok(RagResponse {
            answer: answer.text,
            sources: answer.citations,
            session_id,
        })
    }

    /// Ingest one course file. Returns the course and the number of passages stored.
    #[instrument(skip(self))]
    pub async fn add_course_file(&self, path: &Path) -> Result<(Course, usize)> {
        let (course, chunks) = load_course_file(path)?;
        self.store.add_course(&course).await?;
        let stored = self.store.add_chunks(&chunks).await?;
        info!("Added course '{}' with {} passages", course.title, stored);
        Ok((course, stored))
    }

    /// Ingest every course file in a directory, skipping courses already stored.
    ///
    /// Returns the number of courses and passages added.
    #[instrument(skip(self))]
    pub async fn add_course_folder(&self, dir: &Path, clear_existing: bool) -> Result<(usize, usize)> {
        if clear_existing {
            info!("Clearing existing courses");
            self.store.clear().await?;
        }

        let mut existing = self.store.course_titles().await?;
        let mut courses = 0;
        let mut passages = 0;

        for path in course_files_in(dir)? {
            let (course, chunks) = match load_course_file(&path) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Skipping {:?}: {}", path, e);
                    continue;
                }
            };

            if existing.contains(&course.title) {
                info!("Course already stored: {}", course.title);
                continue;
            }

            self.store.add_course(&course).await?;
            passages += self.store.add_chunks(&chunks).await?;
            courses += 1;
            existing.push(course.title);
        }

        Ok((courses, passages))
    }

    /// Number and titles of stored courses.
    pub async fn course_analytics(&self) -> Result<CourseAnalytics> {
        let titles = self.store.course_titles().await?;
        Ok(CourseAnalytics {
            total_courses: titles.len(),
            course_titles: titles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentBlock, LlmResponse, StopReason};
    use crate::testing::{HashEmbedder, ScriptedLlm, ScriptedReply};
    use crate::vector_store::MemoryVectorStore;

    fn system(replies: Vec<ScriptedReply>) -> (RagSystem, Arc<ScriptedLlm>) {
        let llm = Arc::new(ScriptedLlm::new(replies));
        let store = Arc::new(MemoryVectorStore::new(Arc::new(HashEmbedder::default()), 5));
        let system = RagSystem::with_components(
            &Settings::default(),
            llm.clone(),
            store,
            Prompts::default(),
        );
        (system, llm)
    }

    fn text(reply: &str) -> ScriptedReply {
        ScriptedReply::Response(LlmResponse {
            stop_reason: StopReason::EndTurn,
            content: vec![ContentBlock::text(reply)],
        })
    }

    #[tokio::test]
    async fn test_query_offers_both_tools_and_wraps_question() {
        let (system, llm) = system(vec![text("Hello")]);
        let response = system.query("What is RAG?", None).await.unwrap();

        assert_eq!(response.answer, "Hello");
        assert!(response.sources.is_empty());

        let requests = llm.requests();
        let names: Vec<_> = requests[0]
            .tools
            .as_ref()
            .unwrap()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["search_course_content", "get_course_outline"]);
        assert_eq!(
            requests[0].messages[0].content,
            crate::llm::MessageContent::Text(
                "Answer this question about course materials: What is RAG?".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_session_history_reaches_system_prompt() {
        let (system, llm) = system(vec![text("first"), text("second")]);
        let first = system.query("one", None).await.unwrap();
        system.query("two", Some(&first.session_id)).await.unwrap();

        let requests = llm.requests();
        assert!(!requests[0].system.contains("Previous conversation"));
        assert!(requests[1]
            .system
            .ends_with("Previous conversation:\nUser: one\nAssistant: first"));
    }

    #[test]
    fn test_course_analytics_on_empty_store() {
        let (system, _) = system(Vec::new());
        let analytics = tokio_test::block_on(system.course_analytics()).unwrap();
        assert_eq!(analytics.total_courses, 0);
        assert!(analytics.course_titles.is_empty());
    }

    #[tokio::test]
    async fn test_add_course_folder_skips_known_courses() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("course1.json"),
            r#"{"course_title": "Intro", "lessons": [{"lesson_number": 1, "lesson_title": "A", "content": "alpha"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();

        let (system, _) = system(Vec::new());
        assert_eq!(system.add_course_folder(dir.path(), false).await.unwrap(), (1, 1));
        assert_eq!(system.add_course_folder(dir.path(), false).await.unwrap(), (0, 0));
        assert_eq!(system.add_course_folder(dir.path(), true).await.unwrap(), (1, 1));
    }
}
