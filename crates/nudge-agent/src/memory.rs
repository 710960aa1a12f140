//! Optional knowledge-graph file used to personalise prompts.
//!
//! The file is JSON lines, one item per line:
//!
//! ```text
//! {"type":"entity","name":"Alex","entityType":"Person","observations":["..."]}
//! {"type":"relation","from":"Alex","to":"Kana","relationType":"engaged to"}
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

const MAX_ENTITIES: usize = 12;
const MAX_RELATIONS: usize = 12;
const MAX_OBSERVATIONS: usize = 3;
const MAX_CONTEXT_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MemoryItem {
    #[serde(rename_all = "camelCase")]
    Entity {
        name: String,
        #[serde(default)]
        entity_type: String,
        #[serde(default)]
        observations: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Relation {
        from: String,
        to: String,
        relation_type: String,
    },
}

/// Parse JSON-lines content. Malformed lines are skipped.
pub fn parse_memory(content: &str) -> Vec<MemoryItem> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|line| match serde_json::from_str::<MemoryItem>(line) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!(error = %e, "skipping malformed memory line");
                None
            }
        })
        .collect()
}

/// Condense memory items into a bounded prompt section.
///
/// Event and state entities come first since they describe what is going
/// on right now.
pub fn memory_context(items: &[MemoryItem]) -> String {
    let mut entities: Vec<(&str, &str, &[String])> = items
        .iter()
        .filter_map(|i| match i {
            MemoryItem::Entity {
                name,
                entity_type,
                observations,
            } => Some((name.as_str(), entity_type.as_str(), observations.as_slice())),
            MemoryItem::Relation { .. } => None,
        })
        .collect();
    entities.sort_by_key(|(_, kind, _)| match kind.to_lowercase().as_str() {
        "state" | "emotion" => 0,
        "event" => 1,
        _ => 2,
    });

    let mut out = String::new();
    for (name, kind, observations) in entities.into_iter().take(MAX_ENTITIES) {
        let obs = observations
            .iter()
            .take(MAX_OBSERVATIONS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("; ");
        if kind.is_empty() {
            out.push_str(&format!("- {name}: {obs}\n"));
        } else {
            out.push_str(&format!("- {name} ({kind}): {obs}\n"));
        }
    }

    let relations: Vec<String> = items
        .iter()
        .filter_map(|i| match i {
            MemoryItem::Relation {
                from,
                to,
                relation_type,
            } => Some(format!("- {from} {relation_type} {to}")),
            MemoryItem::Entity { .. } => None,
        })
        .take(MAX_RELATIONS)
        .collect();
    if !relations.is_empty() {
        out.push_str("Relations:\n");
        out.push_str(&relations.join("\n"));
        out.push('\n');
    }

    truncate_chars(out.trim_end(), MAX_CONTEXT_CHARS)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Where the composer reads memory from, if anywhere.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    path: Option<PathBuf>,
}

impl MemorySource {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read and condense the file. Missing or unreadable files yield "".
    pub async fn load_context(&self) -> String {
        let Some(path) = &self.path else {
            return String::new();
        };
        match tokio::fs::read_to_string(path).await {
            Ok(content) => memory_context(&parse_memory(&content)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "memory file unreadable");
                String::new()
            }
        }
    }
}
