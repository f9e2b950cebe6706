use futures::StreamExt;
use log::{ debug, warn };
use std::sync::Arc;

use super::chat::{ ChatClient, FragmentStream };
use super::CompletionOptions;
use crate::error::{ MentorError, Result };
use crate::models::chat::ChatMessage;

/// Sends the running message list to the model and surfaces the reply as it arrives.
#[derive(Clone)]
pub struct ResponseStreamer {
    client: Arc<dyn ChatClient>,
}

impl ResponseStreamer {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }

    pub async fn fragments(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions
    ) -> Result<FragmentStream> {
        self.client.stream_completion(messages, options).await
    }

    /// Calls `on_fragment` once per fragment in arrival order and returns their
    /// concatenation. Delivered fragments are never retracted; on a mid-stream
    /// failure the text received so far travels in `StreamInterrupted::partial`.
    pub async fn stream<F>(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        mut on_fragment: F
    ) -> Result<String>
        where F: FnMut(&str) + Send
    {
        let mut fragments = self.fragments(messages, options).await?;
        let mut text = String::new();
        let mut count = 0usize;

        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    on_fragment(&fragment);
                    text.push_str(&fragment);
                    count += 1;
                }
                Err(MentorError::StreamInterrupted { reason, .. }) => {
                    warn!("Response stream interrupted after {} fragments: {}", count, reason);
                    return Err(MentorError::StreamInterrupted { reason, partial: text });
                }
                Err(e) if count > 0 => {
                    warn!("Response stream failed after {} fragments: {}", count, e);
                    return Err(MentorError::StreamInterrupted { reason: e.to_string(), partial: text });
                }
                Err(e) => {
                    return Err(e);
                }
            }
        }

        debug!("Response stream completed: {} fragments, {} bytes", count, text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::CompletionResponse;
    use crate::llm::LlmType;
    use async_trait::async_trait;

    struct ScriptedClient {
        items: Vec<std::result::Result<&'static str, &'static str>>,
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions
        ) -> Result<CompletionResponse> {
            Err(MentorError::ExternalService("not scripted".into()))
        }

        async fn stream_completion(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions
        ) -> Result<FragmentStream> {
            let items: Vec<Result<String>> = self.items
                .iter()
                .map(|item| match item {
                    Ok(text) => Ok(text.to_string()),
                    Err(reason) => Err(MentorError::interrupted(*reason)),
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }

        fn get_base_url(&self) -> Option<String> {
            None
        }

        fn get_llm_type(&self) -> LlmType {
            LlmType::OpenAI
        }
    }

    fn streamer(items: Vec<std::result::Result<&'static str, &'static str>>) -> ResponseStreamer {
        ResponseStreamer::new(Arc::new(ScriptedClient { items }))
    }

    #[tokio::test]
    async fn callback_sees_every_fragment_in_order() {
        let streamer = streamer(vec![Ok("A list "), Ok("comprehension "), Ok(""), Ok("builds lists.")]);
        let mut seen = Vec::new();
        let text = streamer
            .stream(&[ChatMessage::user("q")], &CompletionOptions::new("m"), |f| seen.push(f.to_string()))
            .await
            .unwrap();

        assert_eq!(seen, vec!["A list ", "comprehension ", "", "builds lists."]);
        assert_eq!(text, seen.concat());
    }

    #[tokio::test]
    async fn interruption_keeps_partial_text() {
        let streamer = streamer(vec![Ok("Hello"), Ok(", wor"), Err("connection reset")]);
        let mut seen = Vec::new();
        let err = streamer
            .stream(&[], &CompletionOptions::new("m"), |f| seen.push(f.to_string()))
            .await
            .unwrap_err();

        match err {
            MentorError::StreamInterrupted { reason, partial } => {
                assert_eq!(reason, "connection reset");
                assert_eq!(partial, "Hello, wor");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(seen, vec!["Hello", ", wor"]);
    }

    #[tokio::test]
    async fn non_streaming_client_falls_back_to_complete() {
        struct WholeReply;

        #[async_trait]
        impl ChatClient for WholeReply {
            async fn complete(
                &self,
                messages: &[ChatMessage],
                options: &CompletionOptions
            ) -> Result<CompletionResponse> {
                Ok(CompletionResponse {
                    response: format!("{} messages via {}", messages.len(), options.model),
                })
            }

            fn get_base_url(&self) -> Option<String> {
                None
            }

            fn get_llm_type(&self) -> LlmType {
                LlmType::Ollama
            }
        }

        let streamer = ResponseStreamer::new(Arc::new(WholeReply));
        let mut calls = 0;
        let text = streamer
            .stream(&[ChatMessage::user("q")], &CompletionOptions::new("m1"), |_| calls += 1)
            .await
            .unwrap();
        assert_eq!(text, "1 messages via m1");
        assert_eq!(calls, 1);
    }
}
