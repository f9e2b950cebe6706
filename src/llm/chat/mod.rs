pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Stream, StreamExt, Future };
use serde::{ Deserialize, Serialize };
use std::pin::Pin;
use std::sync::Arc;
use super::{ CompletionOptions, LlmConfig, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::error::{ MentorError, Result };
use crate::models::chat::ChatMessage;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Finite, non-restartable sequence of response fragments in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions
    ) -> Result<CompletionResponse>;

    /// Providers without native streaming deliver the whole reply as one fragment.
    async fn stream_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions
    ) -> Result<FragmentStream> {
        let response = self.complete(messages, options).await?;
        Ok(full_response_as_stream(response.response))
    }

    fn get_base_url(&self) -> Option<String>;
    fn get_llm_type(&self) -> LlmType;
}

pub fn full_response_as_stream(response: String) -> FragmentStream {
    Box::pin(futures::stream::once(async move { Ok(response) }))
}

pub fn create_streaming_response<F, Fut>(response_fn: F) -> FragmentStream
where
    F: FnOnce(mpsc::Sender<Result<String>>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// What a single line of a streamed body means to the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Fragment(String),
    Done,
    Failed(String),
    Skip,
}

/// Splits a chunked byte body into complete lines. Lines and multi-byte
/// characters may be cut anywhere by the transport.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// Returns the trailing line that was never terminated by a newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = if raw.last() == Some(&b'\r') { &raw[..raw.len() - 1] } else { raw };
    String::from_utf8_lossy(raw).into_owned()
}

async fn forward_event(tx: &mpsc::Sender<Result<String>>, event: LineEvent) -> bool {
    match event {
        LineEvent::Fragment(text) => tx.send(Ok(text)).await.is_ok(),
        LineEvent::Skip => true,
        LineEvent::Done => false,
        LineEvent::Failed(reason) => {
            let _ = tx.send(Err(MentorError::interrupted(reason))).await;
            false
        }
    }
}

/// POSTs `payload` and turns the line-oriented response body into fragments.
/// Failures before the body starts are `ExternalService`; anything after is
/// `StreamInterrupted`, including a body that ends without a completion line.
pub fn http_stream_generate<P>(
    http: reqwest::Client,
    url: String,
    payload: P,
    line_parser: fn(&str) -> LineEvent
) -> FragmentStream
    where P: Serialize + Send + 'static
{
    create_streaming_response(move |tx| async move {
        let resp = match http.post(&url).json(&payload).send().await {
            Ok(r) => r,
            Err(e) => {
                let _ = tx.send(Err(MentorError::ExternalService(e.to_string()))).await;
                return;
            }
        };

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let _ = tx
                .send(Err(MentorError::ExternalService(format!("API error ({}): {}", status, body))))
                .await;
            return;
        }

        let mut lines = LineBuffer::default();
        let mut bytes = resp.bytes_stream();
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(buf) => {
                    for line in lines.push(&buf) {
                        if !forward_event(&tx, line_parser(&line)).await {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(MentorError::interrupted(e.to_string()))).await;
                    return;
                }
            }
        }

        if let Some(line) = lines.finish() {
            if !forward_event(&tx, line_parser(&line)).await {
                return;
            }
        }
        let _ = tx.send(Err(MentorError::interrupted("stream ended before completion"))).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_joins_lines_split_across_chunks() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        assert_eq!(buffer.push(b":1}\r\ndata: x\n"), vec!["data: {\"a\":1}", "data: x"]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn line_buffer_keeps_multibyte_characters_intact() {
        let text = "héllo\n".as_bytes();
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(&text[..2]).is_empty());
        assert_eq!(buffer.push(&text[2..]), vec!["héllo"]);
    }

    #[test]
    fn line_buffer_flushes_unterminated_tail() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"{\"done\":true}").is_empty());
        assert_eq!(buffer.finish().as_deref(), Some("{\"done\":true}"));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn factory_builds_the_configured_provider() {
        let config = LlmConfig {
            llm_type: LlmType::Ollama,
            api_key: None,
            base_url: Some("http://ollama.local:11434".into()),
            use_responses_api: false,
        };
        let client = new_client(&config).unwrap();
        assert_eq!(client.get_llm_type(), LlmType::Ollama);
        assert_eq!(client.get_base_url().as_deref(), Some("http://ollama.local:11434"));

        let config = LlmConfig { llm_type: LlmType::OpenAI, api_key: Some("sk-test".into()), base_url: None, use_responses_api: true };
        assert_eq!(new_client(&config).unwrap().get_llm_type(), LlmType::OpenAI);

        let config = LlmConfig { api_key: None, ..config };
        assert!(matches!(new_client(&config), Err(MentorError::InvalidSettings(_))));
    }

    #[tokio::test]
    async fn full_response_is_a_single_fragment() {
        let fragments: Vec<String> = full_response_as_stream("whole".into())
            .map(|r| r.unwrap())
            .collect().await;
        assert_eq!(fragments, vec!["whole"]);
    }
}
