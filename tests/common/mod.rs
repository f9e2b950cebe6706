#![allow(dead_code)]

use async_trait::async_trait;
use pymentor::config::settings::{ ModelCatalog, DEFAULT_TEMPERATURE };
use pymentor::error::{ MentorError, Result };
use pymentor::history::{ ConversationStore, InMemoryConversationStore };
use pymentor::llm::chat::{ ChatClient, CompletionResponse, FragmentStream };
use pymentor::llm::streamer::ResponseStreamer;
use pymentor::llm::title::TitleGenerator;
use pymentor::llm::{ CompletionOptions, LlmType };
use pymentor::models::chat::ChatMessage;
use pymentor::session::SessionController;
use std::collections::VecDeque;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };

pub const SYSTEM_PROMPT: &str = "You are PyMentor, a helpful Python Tutor.";

/// Chat client that replays queued title replies and streamed reply scripts.
#[derive(Default)]
pub struct ScriptedClient {
    titles: Mutex<VecDeque<std::result::Result<String, String>>>,
    replies: Mutex<VecDeque<Vec<std::result::Result<String, String>>>>,
    title_calls: AtomicUsize,
    stream_requests: Mutex<Vec<(Vec<ChatMessage>, CompletionOptions)>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(self, title: &str) -> Self {
        self.titles.lock().unwrap().push_back(Ok(title.to_string()));
        self
    }

    pub fn title_error(self, reason: &str) -> Self {
        self.titles.lock().unwrap().push_back(Err(reason.to_string()));
        self
    }

    pub fn reply(self, fragments: &[&str]) -> Self {
        let script = fragments.iter().map(|f| Ok(f.to_string())).collect();
        self.replies.lock().unwrap().push_back(script);
        self
    }

    /// Delivers `fragments`, then fails mid-stream.
    pub fn broken_reply(self, fragments: &[&str], reason: &str) -> Self {
        let mut script: Vec<_> = fragments.iter().map(|f| Ok(f.to_string())).collect();
        script.push(Err(reason.to_string()));
        self.replies.lock().unwrap().push_back(script);
        self
    }

    pub fn title_calls(&self) -> usize {
        self.title_calls.load(Ordering::SeqCst)
    }

    pub fn stream_requests(&self) -> Vec<(Vec<ChatMessage>, CompletionOptions)> {
        self.stream_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions
    ) -> Result<CompletionResponse> {
        self.title_calls.fetch_add(1, Ordering::SeqCst);
        match self.titles.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(CompletionResponse { response }),
            Some(Err(reason)) => Err(MentorError::ExternalService(reason)),
            None => Err(MentorError::ExternalService("no title scripted".into())),
        }
    }

    async fn stream_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions
    ) -> Result<FragmentStream> {
        self.stream_requests.lock().unwrap().push((messages.to_vec(), options.clone()));
        let script = self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| MentorError::ExternalService("no reply scripted".into()))?;
        let items: Vec<Result<String>> = script
            .into_iter()
            .map(|item| item.map_err(MentorError::interrupted))
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

pub fn catalog() -> ModelCatalog {
    ModelCatalog::new(vec!["gpt-5.1".into(), "gpt-4.1-mini".into()], DEFAULT_TEMPERATURE).unwrap()
}

pub fn controller_with_store(
    client: Arc<ScriptedClient>,
    store: Arc<dyn ConversationStore>
) -> SessionController {
    let chat_client: Arc<dyn ChatClient> = client;
    SessionController::new(
        store,
        ResponseStreamer::new(Arc::clone(&chat_client)),
        TitleGenerator::new(chat_client, "gpt-4.1-mini", "Generate a short title."),
        catalog()
    )
}

pub fn controller(client: Arc<ScriptedClient>) -> (Arc<InMemoryConversationStore>, SessionController) {
    let store = Arc::new(InMemoryConversationStore::new(SYSTEM_PROMPT));
    let controller = controller_with_store(client, store.clone());
    (store, controller)
}
