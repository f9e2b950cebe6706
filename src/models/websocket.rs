use serde::{ Serialize, Deserialize };
use crate::models::chat::{ ChatMessage, ConversationSummary };

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    #[serde(rename = "new_chat")]
    NewChat,
    #[serde(rename = "list_chats")]
    ListChats,
    #[serde(rename = "switch_chat")] SwitchChat {
        id: String,
    },
    #[serde(rename = "delete_chat")]
    DeleteChat,
    #[serde(rename = "settings")] Settings {
        model: Option<String>,
        temperature: Option<f32>,
    },
    #[serde(rename = "history")]
    History,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "session")] Session {
        conversation_id: String,
        title: String,
        messages: Vec<ChatMessage>,
        message_count: usize,
        model: String,
        temperature: f32,
    },
    #[serde(rename = "chats")] Chats {
        items: Vec<ConversationSummary>,
    },
    #[serde(rename = "processing")]
    Processing,
    #[serde(rename = "partial")] Partial {
        content: String,
    },
    #[serde(rename = "title")] Title {
        title: String,
    },
    #[serde(rename = "response")] Response {
        content: String,
        timestamp: i64,
    },
    #[serde(rename = "error")] Error {
        message: String,
    },
}
