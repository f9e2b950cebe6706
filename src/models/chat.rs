use serde::{ Serialize, Deserialize };
use std::fmt;

/// Title shown for a conversation whose title has not been generated yet.
pub const NEW_CHAT_TITLE: &str = "New Chat";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    pub id: String,
    /// `None` until a title has been generated from the first user message.
    pub title: Option<String>,
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, system_prompt: &str) -> Self {
        Self {
            id: id.into(),
            title: None,
            messages: vec![ChatMessage::system(system_prompt)],
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(NEW_CHAT_TITLE)
    }

    pub fn has_title(&self) -> bool {
        self.title.is_some()
    }

    /// Number of user and assistant messages; the system prompt is not counted.
    pub fn message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .count()
    }

    pub fn visible_messages(&self) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }

    pub fn to_record(&self) -> ConversationRecord {
        ConversationRecord {
            title: self.display_title().to_string(),
            title_assigned: Some(self.has_title()),
            messages: self.messages.clone(),
        }
    }

    pub fn from_record(id: impl Into<String>, record: ConversationRecord) -> Self {
        let assigned = record.title_assigned.unwrap_or(record.title != NEW_CHAT_TITLE);
        Self {
            id: id.into(),
            title: if assigned { Some(record.title) } else { None },
            messages: record.messages,
        }
    }
}

/// On-disk shape of a conversation. The id is not stored; it names the record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub title: String,
    /// Missing in records written before the flag existed; derived from the title then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_assigned: Option<bool>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id.clone(),
            title: conversation.display_title().to_string(),
            message_count: conversation.message_count(),
        }
    }
}
