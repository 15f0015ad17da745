//! Course material types and the JSON course-file loader.

use crate::error::{LektorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A lesson within a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub number: u32,
    pub title: String,
    pub link: Option<String>,
}

/// A course and its ordered lesson list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// Course title; unique within a store.
    pub title: String,
    pub instructor: Option<String>,
    pub link: Option<String>,
    pub lessons: Vec<Lesson>,
}

impl Course {
    /// Link of the lesson with this number, if it has one.
    pub fn lesson_link(&self, number: u32) -> Option<&str> {
        self.lessons
            .iter()
            .find(|l| l.number == number)
            .and_then(|l| l.link.as_deref())
    }
}

/// A passage of course text indexed for search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseChunk {
    pub course_title: String,
    pub lesson_number: Option<u32>,
    /// Position of this chunk within its course.
    pub chunk_index: u32,
    pub content: String,
}

#[derive(Deserialize)]
struct LessonFile {
    lesson_number: u32,
    lesson_title: String,
    #[serde(default)]
    lesson_link: Option<String>,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct CourseFile {
    course_title: String,
    #[serde(default)]
    instructor: Option<String>,
    #[serde(default)]
    course_link: Option<String>,
    #[serde(default)]
    lessons: Vec<LessonFile>,
}

/// Parse a course JSON document into a course and one chunk per non-empty lesson.
pub fn parse_course(json: &str) -> Result<(Course, Vec<CourseChunk>)> {
    let file: CourseFile = serde_json::from_str(json)?;

    if file.course_title.trim().is_empty() {
        return Err(LektorError::InvalidInput("Course title is empty".to_string()));
    }

    let title = file.course_title.trim().to_string();
    let mut lessons = Vec::with_capacity(file.lessons.len());
    let mut chunks = Vec::new();

    for lesson in file.lessons {
        if !lesson.content.trim().is_empty() {
            chunks.push(CourseChunk {
                course_title: title.clone(),
                lesson_number: Some(lesson.lesson_number),
                chunk_index: chunks.len() as u32,
                content: lesson.content.trim().to_string(),
            });
        }
        lessons.push(Lesson {
            number: lesson.lesson_number,
            title: lesson.lesson_title,
            link: lesson.lesson_link,
        });
    }

    lessons.sort_by_key(|l| l.number);

    let course = Course {
        title,
        instructor: file.instructor,
        link: file.course_link,
        lessons,
    };

    Ok((course, chunks))
}

/// Load a single course file.
pub fn load_course_file(path: &Path) -> Result<(Course, Vec<CourseChunk>)> {
    let content = std::fs::read_to_string(path)?;
    parse_course(&content)
}

/// List the `.json` course files in a directory, sorted by name.
pub fn course_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(LektorError::InvalidInput(format!(
            "Not a directory: {}",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            let is_json = p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            if !is_json {
                debug!("Skipping non-course file {:?}", p);
            }
            is_json
        })
        .collect();

    if files.is_empty() {
        warn!("No course files found in {:?}", dir);
    }

    files.sort();
    Ok(files)
}
