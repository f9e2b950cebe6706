use log::info;
use std::sync::Arc;

use super::chat::ChatClient;
use super::CompletionOptions;
use crate::error::{ MentorError, Result };
use crate::models::chat::ChatMessage;

/// Derives a short conversation label from the first user message.
#[derive(Clone)]
pub struct TitleGenerator {
    client: Arc<dyn ChatClient>,
    model: String,
    instruction: String,
}

impl TitleGenerator {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            instruction: instruction.into(),
        }
    }

    pub async fn generate(&self, first_user_message: &str) -> Result<String> {
        let messages = [ChatMessage::system(self.instruction.as_str()), ChatMessage::user(first_user_message)];
        let options = CompletionOptions::new(self.model.as_str());
        let response = self.client.complete(&messages, &options).await?;
        let title = response.response.trim();
        if title.is_empty() {
            return Err(MentorError::ExternalService("title model returned an empty response".into()));
        }
        info!("Generated conversation title: {}", title);
        Ok(title.to_string())
    }
}
