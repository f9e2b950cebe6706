use async_trait::async_trait;
use log::debug;
use reqwest::{Client as HttpClient, header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION}};
use serde::{Deserialize, Serialize};

use super::{http_stream_generate, ChatClient, CompletionResponse, FragmentStream, LineEvent};
use crate::error::{MentorError, Result};
use crate::llm::{CompletionOptions, LlmConfig, LlmType};
use crate::models::chat::ChatMessage;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIChatClient {
    http: HttpClient,
    base_url: String,
    use_responses_endpoint: bool,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize)]
struct OpenAIResponsesRequest {
    model: String,
    input: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponsesResponse {
    #[serde(default)]
    output: Vec<OpenAIOutputItem>,
}

#[derive(Deserialize)]
struct OpenAIOutputItem {
    #[serde(default)]
    content: Vec<OpenAIOutputContent>,
}

#[derive(Deserialize)]
struct OpenAIOutputContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponsesStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    response: Option<serde_json::Value>,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        use_responses_endpoint: bool,
    ) -> Result<Self> {
        let api_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| MentorError::InvalidSettings(format!("Invalid API key format: {}", e)))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: api_url,
            use_responses_endpoint,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| MentorError::InvalidSettings("OpenAI API key is required".to_string()))?;

        Self::new(api_key, config.base_url.clone(), config.use_responses_api)
    }

    fn endpoint(&self, route: &str) -> String {
        if self.base_url.ends_with(route) {
            self.base_url.clone()
        } else {
            format!("{}{}", self.base_url.trim_end_matches('/'), route)
        }
    }

    async fn complete_chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions
    ) -> Result<String> {
        let req = OpenAIChatRequest {
            model: options.model.clone(),
            messages: messages.to_vec(),
            temperature: options.temperature,
            stream: None,
        };

        let resp = self.http.post(self.endpoint("/chat/completions"))
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<OpenAIResponse>()
            .await?;

        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| MentorError::ExternalService("No response from OpenAI API".to_string()))
    }

    async fn complete_responses(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions
    ) -> Result<String> {
        let req = OpenAIResponsesRequest {
            model: options.model.clone(),
            input: messages.to_vec(),
            temperature: options.temperature,
            stream: None,
        };

        let resp = self.http.post(self.endpoint("/responses"))
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<OpenAIResponsesResponse>()
            .await?;

        Ok(output_text(&resp))
    }
}

fn output_text(resp: &OpenAIResponsesResponse) -> String {
    resp.output
        .iter()
        .flat_map(|item| item.content.iter())
        .filter(|c| c.content_type == "output_text")
        .filter_map(|c| c.text.as_deref())
        .collect()
}

pub fn parse_chat_stream_line(line: &str) -> LineEvent {
    let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
        return LineEvent::Skip;
    };
    if data == "[DONE]" {
        return LineEvent::Done;
    }
    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(stream_resp) => {
            let content: String = stream_resp.choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if content.is_empty() { LineEvent::Skip } else { LineEvent::Fragment(content) }
        }
        Err(e) => {
            debug!("JSON parse error: {} for data: {}", e, data);
            LineEvent::Skip
        }
    }
}

pub fn parse_responses_stream_line(line: &str) -> LineEvent {
    let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
        return LineEvent::Skip;
    };
    let event = match serde_json::from_str::<OpenAIResponsesStreamEvent>(data) {
        Ok(event) => event,
        Err(e) => {
            debug!("JSON parse error: {} for data: {}", e, data);
            return LineEvent::Skip;
        }
    };
    match event.event_type.as_str() {
        "response.output_text.delta" => match event.delta {
            Some(delta) if !delta.is_empty() => LineEvent::Fragment(delta),
            _ => LineEvent::Skip,
        },
        "response.completed" => LineEvent::Done,
        "response.failed" | "response.incomplete" => {
            let reason = event.response
                .as_ref()
                .and_then(|r| r.pointer("/error/message").and_then(|m| m.as_str()))
                .unwrap_or(event.event_type.as_str())
                .to_string();
            LineEvent::Failed(reason)
        }
        "error" => LineEvent::Failed(event.message.unwrap_or_else(|| "unknown stream error".to_string())),
        _ => LineEvent::Skip,
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions
    ) -> Result<CompletionResponse> {
        let response = if self.use_responses_endpoint {
            self.complete_responses(messages, options).await?
        } else {
            self.complete_chat(messages, options).await?
        };
        Ok(CompletionResponse { response })
    }

    async fn stream_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions
    ) -> Result<FragmentStream> {
        if self.use_responses_endpoint {
            let req = OpenAIResponsesRequest {
                model: options.model.clone(),
                input: messages.to_vec(),
                temperature: options.temperature,
                stream: Some(true),
            };
            Ok(http_stream_generate(
                self.http.clone(),
                self.endpoint("/responses"),
                req,
                parse_responses_stream_line,
            ))
        } else {
            let req = OpenAIChatRequest {
                model: options.model.clone(),
                messages: messages.to_vec(),
                temperature: options.temperature,
                stream: Some(true),
            };
            Ok(http_stream_generate(
                self.http.clone(),
                self.endpoint("/chat/completions"),
                req,
                parse_chat_stream_line,
            ))
        }
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }

    fn get_llm_type(&self) -> LlmType {
        LlmType::OpenAI
    }
}
