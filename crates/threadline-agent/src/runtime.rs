use threadline_sessions::types::{Message as TranscriptMessage, Role as TranscriptRole};
use tokio::sync::mpsc;
use tracing::info;

use crate::provider::{ChatRequest, LlmProvider, Message, ProviderError, Role};
use crate::stream::StreamEvent;

/// Holds the model provider plus the fixed request settings.
/// Shared across requests via `Arc` in the gateway state.
pub struct ChatRuntime {
    provider: Box<dyn LlmProvider>,
    system: String,
    model: String,
    max_tokens: u32,
}

impl ChatRuntime {
    pub fn new(provider: Box<dyn LlmProvider>, system: String, model: String, max_tokens: u32) -> Self {
        Self {
            provider,
            system,
            model,
            max_tokens,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Stream a reply to `transcript`, sending events to `tx`.
    ///
    /// Returns once the provider finishes or the receiver is dropped.
    pub async fn chat_stream(
        &self,
        transcript: &[TranscriptMessage],
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let req = ChatRequest {
            model: self.model.clone(),
            system: self.system.clone(),
            messages: to_provider_messages(transcript),
            max_tokens: self.max_tokens,
            stream: true,
        };
        info!(
            model = %req.model, provider = %self.provider.name(),
            messages = req.messages.len(), "processing streaming chat request"
        );
        self.provider.send_stream(&req, tx).await
    }
}

/// Flatten a stored transcript into text-only provider messages.
///
/// Non-text parts are dropped; messages left without text and tool messages
/// are skipped.
pub fn to_provider_messages(transcript: &[TranscriptMessage]) -> Vec<Message> {
    transcript
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                TranscriptRole::User => Role::User,
                TranscriptRole::Assistant => Role::Assistant,
                TranscriptRole::System => Role::System,
                TranscriptRole::Tool => return None,
            };
            let content = m.plain_text();
            (!content.trim().is_empty()).then_some(Message { role, content })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use threadline_sessions::types::Part;

    /// Records the last request it was given.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Option<ChatRequest>>,
    }

    #[async_trait]
    impl LlmProvider for std::sync::Arc<Recorder> {
        fn name(&self) -> &str {
            "recorder"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            *self.seen.lock().unwrap() = Some(req.clone());
            Ok(ChatResponse {
                content: "ok".to_string(),
                model: req.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".to_string(),
            })
        }
    }

    #[test]
    fn transcript_flattens_to_text() {
        let mut with_file = TranscriptMessage::text(TranscriptRole::User, "look at this");
        with_file
            .parts
            .push(Part::Opaque(json!({"type": "file", "url": "data:"})));
        let mut only_file = TranscriptMessage::text(TranscriptRole::User, "");
        only_file.parts = vec![Part::Opaque(json!({"type": "file"}))];

        let transcript = vec![
            TranscriptMessage::text(TranscriptRole::System, "sys"),
            with_file,
            only_file,
            TranscriptMessage::text(TranscriptRole::Tool, "tool output"),
            TranscriptMessage::text(TranscriptRole::Assistant, "reply"),
        ];
        let messages = to_provider_messages(&transcript);

        assert_eq!(
            messages,
            vec![
                Message { role: Role::System, content: "sys".to_string() },
                Message { role: Role::User, content: "look at this".to_string() },
                Message { role: Role::Assistant, content: "reply".to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn chat_stream_uses_configured_model_and_prompt() {
        let recorder = std::sync::Arc::new(Recorder::default());
        let runtime = ChatRuntime::new(
            Box::new(recorder.clone()),
            "system text".to_string(),
            "gpt-4o-mini".to_string(),
            128,
        );
        let (tx, mut rx) = mpsc::channel(8);
        runtime
            .chat_stream(&[TranscriptMessage::text(TranscriptRole::User, "hi")], tx)
            .await
            .unwrap();

        let req = recorder.seen.lock().unwrap().clone().unwrap();
        assert_eq!(req.model, "gpt-4o-mini");
        assert_eq!(req.system, "system text");
        assert_eq!(req.max_tokens, 128);
        assert!(req.stream);
        assert!(matches!(rx.recv().await, Some(StreamEvent::TextDelta { .. })));
    }
}
