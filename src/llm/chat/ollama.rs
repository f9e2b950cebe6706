use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use async_trait::async_trait;
use super::{ http_stream_generate, ChatClient, CompletionResponse, FragmentStream, LineEvent };
use crate::error::{ MentorError, Result };
use crate::llm::{ CompletionOptions, LlmConfig, LlmType };
use crate::models::chat::ChatMessage;
use log::debug;

#[derive(Debug)]
pub struct OllamaClient {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatRequestOptions>,
}

#[derive(Serialize)]
struct ChatRequestOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    message: Option<ChatResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: Option<String>) -> Self {
        let url = base_url.unwrap_or_else(|| "http://localhost:11434".into());

        Self {
            http: HttpClient::new(),
            base_url: url,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        if config.llm_type != LlmType::Ollama {
            return Err(MentorError::InvalidSettings("Invalid config type for OllamaClient".into()));
        }

        Ok(Self::new(config.base_url.clone()))
    }

    fn request(&self, messages: &[ChatMessage], options: &CompletionOptions, stream: bool) -> ChatRequest {
        ChatRequest {
            model: options.model.clone(),
            messages: messages.to_vec(),
            stream,
            options: options.temperature.map(|temperature| ChatRequestOptions { temperature }),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }
}

pub fn parse_stream_line(line: &str) -> LineEvent {
    if line.trim().is_empty() {
        return LineEvent::Skip;
    }
    match serde_json::from_str::<StreamResponse>(line) {
        Ok(stream_resp) => {
            if let Some(error) = stream_resp.error {
                return LineEvent::Failed(error);
            }
            if stream_resp.done {
                return LineEvent::Done;
            }
            match stream_resp.message {
                Some(message) if !message.content.is_empty() => LineEvent::Fragment(message.content),
                _ => LineEvent::Skip,
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for line: {}", e, line);
            LineEvent::Skip
        }
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions
    ) -> Result<CompletionResponse> {
        let req = self.request(messages, options, false);
        let resp = self.http.post(self.chat_url()).json(&req).send().await?.error_for_status()?;
        let data = resp.json::<ChatResponse>().await?;
        Ok(CompletionResponse { response: data.message.content })
    }

    async fn stream_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions
    ) -> Result<FragmentStream> {
        let req = self.request(messages, options, true);
        Ok(http_stream_generate(self.http.clone(), self.chat_url(), req, parse_stream_line))
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }

    fn get_llm_type(&self) -> LlmType {
        LlmType::Ollama
    }
}
