pub mod engine;
mod parse;
pub mod prompt;

use serde::{Deserialize, Serialize};

use partmap_core::{AiSettings, ImpressionCategory, JournalEntry, MapGraph, NodeId};

/// Shown in place of a reply whenever the provider can't be reached or
/// returns nothing usable.
pub const APOLOGY: &str = "I'm sorry, I couldn't respond just now. \
Please try again in a moment.";

#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    #[error("AI is not configured: set a provider and model (and an API key unless using ollama)")]
    NotConfigured,
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("build LLM: {0}")]
    Build(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("LLM returned no text")]
    EmptyResponse,
    #[error("part '{0}' not found")]
    PartNotFound(NodeId),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedImpression {
    pub category: ImpressionCategory,
    pub label: String,
}

/// Stream the companion's answer to `transcript`, passing chunks to `sink` as
/// they arrive. On failure the apology is sent to `sink` and returned.
pub async fn reply<F>(
    settings: &AiSettings,
    map: &MapGraph,
    transcript: &[Turn],
    mut sink: F,
) -> String
where
    F: FnMut(&str) + Send,
{
    let system = prompt::companion_system(map);
    tracing::info!(provider = %settings.provider, model = %settings.model, turns = transcript.len(), "companion reply");

    match engine::stream(settings, &system, transcript, &mut sink).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "companion reply failed");
            sink(APOLOGY);
            APOLOGY.to_string()
        }
    }
}

/// A short reflection on one part of the map.
pub async fn analyze_part(
    settings: &AiSettings,
    map: &MapGraph,
    part_id: &NodeId,
) -> Result<String, CompanionError> {
    let part_text = prompt::serialize_part(map, part_id)
        .ok_or_else(|| CompanionError::PartNotFound(part_id.clone()))?;
    let system = prompt::part_analysis_system();
    engine::generate(settings, &system, &prompt::part_message(map, &part_text)).await
}

/// Ask for impressions the user might look for in a part. Returns empty vec
/// on failure.
pub async fn suggest_impressions(
    settings: &AiSettings,
    map: &MapGraph,
    part_id: &NodeId,
) -> Vec<SuggestedImpression> {
    let (Some(part), Some(part_text)) = (map.part(part_id), prompt::serialize_part(map, part_id))
    else {
        return vec![];
    };
    let system = prompt::impression_suggestions_system();

    match engine::generate(settings, &system, &prompt::part_message(map, &part_text)).await {
        Ok(raw) => {
            tracing::debug!(%raw, "raw suggestion output");
            let suggestions = parse::parse_llm_output(&raw, part);
            tracing::info!(part = %part_id, count = suggestions.len(), "parsed impression suggestions");
            suggestions
        }
        Err(e) => {
            tracing::warn!(error = %e, "impression suggestions failed");
            vec![]
        }
    }
}

/// A brief reflection on a journal entry, or the apology on failure.
pub async fn reflect_on_entry(
    settings: &AiSettings,
    entry: &JournalEntry,
    map: Option<&MapGraph>,
) -> String {
    let system = prompt::journal_reflection_system();
    match engine::generate(settings, &system, &prompt::journal_message(entry, map)).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, entry = %entry.id, "journal reflection failed");
            APOLOGY.to_string()
        }
    }
}
