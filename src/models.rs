//! Core data models for the project memory document.
//!
//! Everything the store persists lives in one [`MemoryDocument`]. Records
//! serialize with camelCase keys and ISO-8601 timestamps, and every
//! collection carries `#[serde(default)]` so older or partial documents
//! still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Current document schema version.
pub const DOCUMENT_VERSION: &str = "1.0.0";

/// A unit of work bracketed by `start_session` / `end_session`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub description: String,
    pub started: DateTime<Utc>,
    #[serde(default)]
    pub ended: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    /// Ids of insights recorded while this session was current.
    #[serde(default)]
    pub insights: Vec<String>,
    /// Ids of problems tracked while this session was current.
    #[serde(default)]
    pub problems: Vec<String>,
    #[serde(default)]
    pub solutions: Vec<SolutionRef>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.ended.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(default)]
    pub details: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SolutionRef {
    pub problem_id: String,
    pub solution: String,
    pub successful: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub context: Value,
    /// Keyword relevance in `[0, 1]`, fixed at creation.
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub examples: Vec<String>,
    pub frequency: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub confidence: f64,
}

impl Pattern {
    /// `min(frequency / 10, 1)`.
    pub fn confidence_for(frequency: u32) -> f64 {
        (f64::from(frequency) / 10.0).min(1.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProblemStatus {
    #[default]
    Open,
    Solved,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SolutionAttempt {
    pub timestamp: DateTime<Utc>,
    pub solution: String,
    pub successful: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub status: ProblemStatus,
    #[serde(default)]
    pub attempts: Vec<SolutionAttempt>,
    /// Text of the most recent successful attempt.
    #[serde(default)]
    pub solution: Option<String>,
}

/// Payload of a saved context window.
///
/// Known shapes get their own variant; anything else is kept verbatim as a
/// [`ContextPayload::Blob`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextPayload {
    CodeSnippet {
        #[serde(default)]
        file: Option<String>,
        #[serde(default)]
        language: Option<String>,
        code: String,
    },
    FileReference {
        path: String,
        #[serde(default)]
        line: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    CommandOutput {
        command: String,
        output: String,
        #[serde(default)]
        exit_code: Option<i32>,
    },
    Snapshot {
        description: String,
        #[serde(default)]
        snapshot: Value,
    },
    Blob {
        data: Value,
    },
}

impl ContextPayload {
    /// Interpret arbitrary JSON as a payload, wrapping unknown shapes in a blob.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<ContextPayload>(value.clone()) {
            Ok(payload) => payload,
            Err(_) => ContextPayload::Blob { data: value },
        }
    }

    /// One-line description shown in listings and matched by queries.
    pub fn summary(&self) -> String {
        match self {
            ContextPayload::CodeSnippet { file, language, .. } => match (file, language) {
                (Some(file), _) => format!("Code snippet from {}", file),
                (None, Some(lang)) => format!("Code snippet ({})", lang),
                (None, None) => "Code snippet".to_string(),
            },
            ContextPayload::FileReference { path, line } => match line {
                Some(line) => format!("File reference: {}:{}", path, line),
                None => format!("File reference: {}", path),
            },
            ContextPayload::CommandOutput { command, .. } => {
                format!("Command output: {}", command)
            }
            ContextPayload::Snapshot { description, .. } => format!("Snapshot: {}", description),
            ContextPayload::Blob { data } => match data.as_object() {
                Some(map) => {
                    let keys: Vec<&str> = map.keys().take(3).map(|k| k.as_str()).collect();
                    format!("Context involving: {}", keys.join(", "))
                }
                None => "Unstructured context".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextWindow {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub data: ContextPayload,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Line-count bucket: `<100` simple, `<500` moderate, `<1500` complex.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[default]
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl Complexity {
    pub fn from_line_count(lines: usize) -> Self {
        match lines {
            0..=99 => Complexity::Simple,
            100..=499 => Complexity::Moderate,
            500..=1499 => Complexity::Complex,
            _ => Complexity::VeryComplex,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
            Complexity::VeryComplex => "very_complex",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum FileType {
    #[serde(rename = "UE_Header")]
    FrameworkHeader,
    Header,
    #[serde(rename = "UE_Implementation")]
    FrameworkImplementation,
    Implementation,
    #[serde(rename = "Build_Script")]
    BuildScript,
    #[default]
    Unknown,
}

impl FileType {
    pub fn is_header(&self) -> bool {
        matches!(self, FileType::FrameworkHeader | FileType::Header)
    }

    pub fn is_implementation(&self) -> bool {
        matches!(
            self,
            FileType::FrameworkImplementation | FileType::Implementation
        )
    }
}

/// Scanner-derived metadata for one class, keyed by class name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub file: String,
    pub line_count: usize,
    pub file_type: FileType,
    #[serde(default)]
    pub inheritance: Option<String>,
    #[serde(default)]
    pub is_framework_class: bool,
    #[serde(default)]
    pub has_class_annotation: bool,
    /// Number of functions detected in the declaring file.
    #[serde(default)]
    pub functions: usize,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub purpose: String,
    pub complexity: Complexity,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub key_features: Vec<String>,
    #[serde(default)]
    pub has_components: bool,
    pub last_updated: DateTime<Utc>,
}

/// Scanner-derived metadata for one source file, keyed by relative path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub file_name: String,
    pub file_type: FileType,
    pub line_count: usize,
    pub size: u64,
    /// SHA-256 of the file contents at index time.
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    pub complexity: Complexity,
    pub purpose: String,
    #[serde(default)]
    pub key_features: Vec<String>,
    #[serde(default)]
    pub framework_features: FrameworkFeatures,
    #[serde(default)]
    pub issue_count: usize,
    pub indexed: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

/// Framework-specific markers found in a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkFeatures {
    /// Text inherits from an `A`/`U`/`F`-prefixed base.
    pub is_framework_class: bool,
    /// Reflection macros present, in canonical order.
    pub macros: Vec<String>,
    pub blueprint_exposed: bool,
    /// Component-typed property names.
    pub components: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::str::FromStr for Impact {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Impact::Low),
            "medium" => Ok(Impact::Medium),
            "high" => Ok(Impact::High),
            "critical" => Ok(Impact::Critical),
            other => anyhow::bail!(
                "unknown impact '{}'; expected low, medium, high or critical",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DevelopmentEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub impact: Impact,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Architecture {
    #[serde(default)]
    pub key_system_classes: Vec<String>,
    #[serde(default)]
    pub tech_stack: BTreeMap<String, String>,
}

/// The whole persisted aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDocument {
    pub project_name: String,
    pub created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: String,
    /// Id of the open session, if any.
    #[serde(default)]
    pub current_session_id: Option<String>,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub context_windows: Vec<ContextWindow>,
    #[serde(default)]
    pub key_classes: BTreeMap<String, ClassRecord>,
    #[serde(default)]
    pub important_files: BTreeMap<String, FileRecord>,
    #[serde(default)]
    pub development_history: Vec<DevelopmentEvent>,
    #[serde(default)]
    pub problems: Vec<Problem>,
    #[serde(default)]
    pub architecture: Architecture,
}

fn default_version() -> String {
    DOCUMENT_VERSION.to_string()
}

impl MemoryDocument {
    pub fn new(project_name: &str) -> Self {
        let now = Utc::now();
        Self {
            project_name: project_name.to_string(),
            created: now,
            last_updated: now,
            version: default_version(),
            current_session_id: None,
            sessions: Vec::new(),
            insights: Vec::new(),
            patterns: Vec::new(),
            context_windows: Vec::new(),
            key_classes: BTreeMap::new(),
            important_files: BTreeMap::new(),
            development_history: Vec::new(),
            problems: Vec::new(),
            architecture: Architecture::default(),
        }
    }

    /// Sum of every collection's size.
    pub fn total_items(&self) -> usize {
        self.sessions.len()
            + self.insights.len()
            + self.patterns.len()
            + self.context_windows.len()
            + self.key_classes.len()
            + self.important_files.len()
            + self.development_history.len()
            + self.problems.len()
    }
}

/// Aggregate counts returned by `get_memory_stats`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total_sessions: usize,
    pub total_insights: usize,
    pub total_patterns: usize,
    pub total_problems: usize,
    pub solved_problems: usize,
    pub context_windows: usize,
    pub key_classes: usize,
    pub important_files: usize,
    pub development_events: usize,
    pub total_items: usize,
    /// Size in bytes of the serialized document.
    pub memory_size: usize,
    pub last_updated: DateTime<Utc>,
}
