use futures::StreamExt;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use llm::LLMProvider;

use partmap_core::AiSettings;

use crate::{CompanionError, Role, Turn};

fn map_backend(provider: &str) -> Result<LLMBackend, CompanionError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(CompanionError::UnknownProvider(other.to_string())),
    }
}

fn build(settings: &AiSettings, system: &str) -> Result<Box<dyn LLMProvider>, CompanionError> {
    if !settings.is_configured() {
        return Err(CompanionError::NotConfigured);
    }
    let backend = map_backend(&settings.provider)?;

    let mut builder = LLMBuilder::new()
        .backend(backend)
        .model(&settings.model)
        .system(system);

    if !settings.api_key.is_empty() {
        builder = builder.api_key(&settings.api_key);
    }

    builder
        .build()
        .map_err(|e| CompanionError::Build(e.to_string()))
}

fn to_messages(turns: &[Turn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|t| match t.role {
            Role::User => ChatMessage::user().content(&t.content).build(),
            Role::Assistant => ChatMessage::assistant().content(&t.content).build(),
        })
        .collect()
}

async fn chat(llm: &dyn LLMProvider, messages: &[ChatMessage]) -> Result<String, CompanionError> {
    let response = llm
        .chat(messages)
        .await
        .map_err(|e| CompanionError::Request(e.to_string()))?;

    match response.text() {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(CompanionError::EmptyResponse),
    }
}

/// One-shot completion of a single user message.
pub async fn generate(
    settings: &AiSettings,
    system: &str,
    user_msg: &str,
) -> Result<String, CompanionError> {
    let llm = build(settings, system)?;
    let messages = vec![ChatMessage::user().content(user_msg).build()];
    chat(llm.as_ref(), &messages).await
}

/// Stream a completion for a conversation, handing each chunk to `sink` as it
/// arrives. Providers that can't stream fall back to a single completion,
/// delivered to `sink` as one chunk.
pub async fn stream<F>(
    settings: &AiSettings,
    system: &str,
    turns: &[Turn],
    sink: &mut F,
) -> Result<String, CompanionError>
where
    F: FnMut(&str) + Send,
{
    let llm = build(settings, system)?;
    let messages = to_messages(turns);

    let mut chunks = match llm.chat_stream(&messages).await {
        Ok(chunks) => chunks,
        Err(e) => {
            tracing::debug!(error = %e, provider = %settings.provider, "streaming unavailable, using single completion");
            let text = chat(llm.as_ref(), &messages).await?;
            sink(&text);
            return Ok(text);
        }
    };

    let mut out = String::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| CompanionError::Request(e.to_string()))?;
        sink(&chunk);
        out.push_str(&chunk);
    }
    if out.trim().is_empty() {
        return Err(CompanionError::EmptyResponse);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(matches!(
            map_backend("acme"),
            Err(CompanionError::UnknownProvider(p)) if p == "acme"
        ));
        assert!(map_backend("ollama").is_ok());
    }

    #[tokio::test]
    async fn unconfigured_settings_never_reach_the_network() {
        let err = generate(&AiSettings::default(), "system", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, CompanionError::NotConfigured));
    }
}
