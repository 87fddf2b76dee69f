//! # Practice Topics
//!
//! Practice modes and the catalog of conversation topics a learner can pick from.
//!
//! ## Catalog file format (`topics.catalog_path`):
//! ```toml
//! [[topics]]
//! id = "market"
//! title = "At the Market"
//! description = "Bargain for vegetables."
//! emoji = "🥕"
//! mode = "CASUAL"
//! initial_prompt = "How much are the carrots today?"
//! ```
//!
//! A file replaces the built-in list entirely.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::error::{AppError, AppResult};

/// What the tutor should concentrate on during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum PracticeMode {
    #[default]
    Casual,
    Pronunciation,
    Interview,
    Grammar,
}

impl PracticeMode {
    pub const ALL: [PracticeMode; 4] = [
        PracticeMode::Casual,
        PracticeMode::Pronunciation,
        PracticeMode::Interview,
        PracticeMode::Grammar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PracticeMode::Casual => "CASUAL",
            PracticeMode::Pronunciation => "PRONUNCIATION",
            PracticeMode::Interview => "INTERVIEW",
            PracticeMode::Grammar => "GRAMMAR",
        }
    }

    /// Mode-specific line of the tutor's instruction.
    pub fn guidelines(&self) -> &'static str {
        match self {
            PracticeMode::Pronunciation => "- Focus on correcting pronunciation gently.",
            PracticeMode::Interview => "- Roleplay a professional interview.",
            PracticeMode::Grammar => "- Focus on sentence structure and tenses.",
            PracticeMode::Casual => "- Just have a fun, relaxed chat.",
        }
    }
}

impl fmt::Display for PracticeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PracticeMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PracticeMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::BadRequest(format!("Unknown practice mode: {}", s)))
    }
}

/// One entry of the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub title: String,
    pub description: String,
    pub emoji: String,
    pub mode: PracticeMode,
    pub initial_prompt: String,
}

impl Topic {
    pub fn context(&self) -> TopicContext {
        TopicContext {
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }
}

/// The part of a topic the tutor instruction needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicContext {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    topics: Vec<Topic>,
}

/// Ordered, read-only list of topics.
#[derive(Debug, Clone)]
pub struct TopicCatalog {
    topics: Vec<Topic>,
}

impl TopicCatalog {
    pub fn builtin() -> Self {
        let topic = |id: &str, title: &str, description: &str, emoji: &str, mode, prompt: &str| Topic {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            emoji: emoji.to_string(),
            mode,
            initial_prompt: prompt.to_string(),
        };

        Self {
            topics: vec![
                topic(
                    "intro",
                    "Self Introduction",
                    "Learn to introduce yourself confidently.",
                    "👋",
                    PracticeMode::Casual,
                    "Let's practice introducing yourself. Can you tell me your name and what you do?",
                ),
                topic(
                    "daily-chat",
                    "Daily Chat",
                    "Casual conversation about your day.",
                    "☕",
                    PracticeMode::Casual,
                    "Hi! How is your day going so far? Did you do anything interesting?",
                ),
                topic(
                    "job-interview",
                    "Job Interview",
                    "Practice answering common interview questions.",
                    "💼",
                    PracticeMode::Interview,
                    "Welcome to the interview. Let's start with a simple question: Tell me about yourself.",
                ),
                topic(
                    "pronunciation",
                    "Pronunciation Fix",
                    "Focus on tricky words and sounds.",
                    "🗣️",
                    PracticeMode::Pronunciation,
                    "Let's work on your pronunciation. I'll give you a sentence, and you repeat it. Ready?",
                ),
                topic(
                    "food",
                    "Ordering Food",
                    "Practice ordering at a restaurant.",
                    "🍛",
                    PracticeMode::Casual,
                    "Imagine we are at a restaurant. I am the waiter. What would you like to order today?",
                ),
                topic(
                    "directions",
                    "Giving Directions",
                    "Explain how to get somewhere.",
                    "🗺️",
                    PracticeMode::Casual,
                    "Excuse me, I'm lost. Can you tell me how to get to the bus station from here?",
                ),
            ],
        }
    }

    /// Parse a catalog from TOML text.
    pub fn from_toml(text: &str) -> AppResult<Self> {
        let file: CatalogFile = toml::from_str(text)?;
        Self::from_topics(file.topics)
    }

    /// Read a catalog file from disk.
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("cannot read topic catalog {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_toml(&text)?;
        info!(path = %path.display(), topics = catalog.topics.len(), "Loaded topic catalog");
        Ok(catalog)
    }

    /// Built-in catalog unless `path` is non-empty.
    pub fn from_config_path(path: &str) -> AppResult<Self> {
        if path.trim().is_empty() {
            Ok(Self::builtin())
        } else {
            Self::load(path)
        }
    }

    fn from_topics(topics: Vec<Topic>) -> AppResult<Self> {
        if topics.is_empty() {
            return Err(AppError::ConfigError("topic catalog is empty".to_string()));
        }
        for (index, topic) in topics.iter().enumerate() {
            if topic.id.trim().is_empty() {
                return Err(AppError::ConfigError(format!("topic #{} has an empty id", index + 1)));
            }
            if topics[..index].iter().any(|other| other.id == topic.id) {
                return Err(AppError::ConfigError(format!("duplicate topic id '{}'", topic.id)));
            }
        }
        Ok(Self { topics })
    }

    pub fn list(&self) -> &[Topic] {
        &self.topics
    }

    pub fn get(&self, id: &str) -> Option<&Topic> {
        self.topics.iter().find(|topic| topic.id == id)
    }

    /// Pick the mode and topic context for a session request.
    ///
    /// The explicit mode wins, then the topic's own mode, then `CASUAL`.
    pub fn resolve(
        &self,
        mode: Option<PracticeMode>,
        topic_id: Option<&str>,
    ) -> AppResult<(PracticeMode, Option<TopicContext>)> {
        let topic = match topic_id {
            Some(id) => Some(
                self.get(id)
                    .ok_or_else(|| AppError::NotFound(format!("Topic '{}' not found", id)))?,
            ),
            None => None,
        };

        let mode = mode
            .or_else(|| topic.map(|topic| topic.mode))
            .unwrap_or_default();
        Ok((mode, topic.map(Topic::context)))
    }
}

impl Default for TopicCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
