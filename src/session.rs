use crate::cli::Args;
use crate::config::prompt;
use crate::config::settings::ModelCatalog;
use crate::error::{ MentorError, Result };
use crate::history::{ initialize_conversation_store, ConversationStore };
use crate::llm::chat::new_client as new_chat_client;
use crate::llm::streamer::ResponseStreamer;
use crate::llm::title::TitleGenerator;
use crate::llm::{ CompletionOptions, LlmConfig, LlmType };
use crate::models::chat::{ ChatMessage, Conversation, ConversationSummary };

use log::{ info, warn, error };
use std::error::Error;
use std::sync::Arc;

/// State of one UI session: the active conversation and the call parameters.
/// Each connection owns one; nothing here is shared between sessions.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub conversation: Conversation,
    pub options: CompletionOptions,
}

impl SessionContext {
    pub fn active_id(&self) -> &str {
        &self.conversation.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    /// Set when this turn assigned the conversation's title.
    pub title: Option<String>,
}

pub struct SessionController {
    store: Arc<dyn ConversationStore>,
    streamer: ResponseStreamer,
    titles: TitleGenerator,
    catalog: ModelCatalog,
}

impl SessionController {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        streamer: ResponseStreamer,
        titles: TitleGenerator,
        catalog: ModelCatalog
    ) -> Self {
        Self { store, streamer, titles, catalog }
    }

    pub async fn from_args(args: &Args) -> std::result::Result<Self, Box<dyn Error + Send + Sync>> {
        let prompts = prompt::load_prompts(args.prompts_path.as_deref())?;
        let llm_type: LlmType = args.chat_llm_type.parse()?;
        let chat_config = LlmConfig {
            llm_type,
            api_key: args.effective_api_key(),
            base_url: args.chat_base_url.clone(),
            use_responses_api: args.openai_responses_api,
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, BaseURL={:?}, ResponsesAPI={}",
            chat_client.get_llm_type(),
            chat_client.get_base_url().as_deref().unwrap_or("adapter default"),
            chat_config.use_responses_api
        );

        let catalog = ModelCatalog::new(args.chat_models.clone(), args.chat_temperature)?;
        let store = initialize_conversation_store(args, &prompts.system_prompt).await?;
        let titles = TitleGenerator::new(
            Arc::clone(&chat_client),
            args.title_model.as_str(),
            prompts.title_instruction.as_str()
        );

        Ok(Self::new(store, ResponseStreamer::new(chat_client), titles, catalog))
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// A new session always starts on a freshly created conversation.
    pub async fn start_session(&self) -> Result<SessionContext> {
        let conversation = self.create_and_load().await?;
        Ok(SessionContext {
            conversation,
            options: self.catalog.default_options(),
        })
    }

    pub async fn new_conversation(&self, ctx: &mut SessionContext) -> Result<()> {
        ctx.conversation = self.create_and_load().await?;
        Ok(())
    }

    async fn create_and_load(&self) -> Result<Conversation> {
        let id = self.store.create().await?;
        self.store.load(&id).await
    }

    /// Summaries newest first. Records that cannot be read are skipped.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let ids = self.store.list().await?;
        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.load(&id).await {
                Ok(conversation) => summaries.push(ConversationSummary::from(&conversation)),
                Err(e) => warn!("Skipping conversation {} in listing: {}", id, e),
            }
        }
        Ok(summaries)
    }

    pub async fn load_conversation(&self, id: &str) -> Result<Conversation> {
        self.store.load(id).await
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.store.delete(id).await
    }

    /// Replaces the active conversation with the stored one. On failure `ctx` is untouched.
    pub async fn switch_conversation(&self, ctx: &mut SessionContext, id: &str) -> Result<()> {
        let conversation = self.store.load(id).await?;
        info!("Switched active conversation {} -> {}", ctx.active_id(), id);
        ctx.conversation = conversation;
        Ok(())
    }

    /// Deletes the active conversation and activates a fresh one.
    pub async fn delete_active(&self, ctx: &mut SessionContext) -> Result<()> {
        let id = ctx.active_id().to_string();
        match self.store.delete(&id).await {
            Ok(()) => {}
            Err(MentorError::NotFound(_)) => {
                warn!("Active conversation {} was already gone when deleting", id);
            }
            Err(e) => {
                return Err(e);
            }
        }
        self.new_conversation(ctx).await
    }

    pub fn update_options(
        &self,
        ctx: &mut SessionContext,
        model: Option<&str>,
        temperature: Option<f32>
    ) -> Result<()> {
        let model = model.unwrap_or(ctx.options.model.as_str());
        let temperature = temperature
            .or(ctx.options.temperature)
            .unwrap_or(self.catalog.default_temperature());
        ctx.options = self.catalog.validate(model, temperature)?;
        Ok(())
    }

    /// Runs one turn: user message, title on first message, streamed reply, save.
    /// The turn works on a copy; `ctx` only changes once the save succeeded.
    pub async fn submit_turn<F>(
        &self,
        ctx: &mut SessionContext,
        text: &str,
        on_fragment: F
    ) -> Result<TurnOutcome>
        where F: FnMut(&str) + Send
    {
        if text.trim().is_empty() {
            return Err(MentorError::EmptyMessage);
        }

        let mut conversation = ctx.conversation.clone();
        conversation.messages.push(ChatMessage::user(text));

        let mut assigned_title = None;
        if !conversation.has_title() {
            match self.titles.generate(text).await {
                Ok(title) => {
                    conversation.title = Some(title.clone());
                    assigned_title = Some(title);
                }
                Err(e) => warn!("Title generation failed for {}, keeping placeholder: {}", conversation.id, e),
            }
        }

        let reply = self.streamer
            .stream(&conversation.messages, &ctx.options, on_fragment).await
            .map_err(|e| {
                error!("Response streaming failed for {}: {}", conversation.id, e);
                e
            })?;
        conversation.messages.push(ChatMessage::assistant(reply.as_str()));

        self.store.save(&conversation.id, &conversation).await?;
        ctx.conversation = conversation;

        Ok(TurnOutcome {
            reply,
            title: assigned_title,
        })
    }
}
