use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- History Store Args ---
    /// Conversation store type (file, redis, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "file")]
    pub history_type: String,

    /// Directory holding one JSON file per conversation (file store only).
    #[arg(long, env = "HISTORY_DIR", default_value = "chats")]
    pub history_dir: String,

    /// Conversation store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis conversation keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "conversation:")]
    pub history_redis_prefix: String,

    /// Batch size for Redis SCAN command when listing conversations.
    #[arg(long, env = "HISTORY_REDIS_SCAN_COUNT", default_value = "100")]
    pub history_redis_scan_count: usize,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., https://api.openai.com/v1)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider. Falls back to OPENAI_API_KEY.
    #[arg(long, env = "CHAT_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Models the user may pick from, comma separated. The first one is the default.
    #[arg(long, env = "CHAT_MODELS", value_delimiter = ',', default_value = "gpt-5.1,gpt-4.1-mini")]
    pub chat_models: Vec<String>,

    /// Default sampling temperature (0.0 to 2.0).
    #[arg(long, env = "CHAT_TEMPERATURE", default_value = "0.7")]
    pub chat_temperature: f32,

    /// Model used to generate conversation titles.
    #[arg(long, env = "TITLE_MODEL", default_value = "gpt-4.1-mini")]
    pub title_model: String,

    /// Use the OpenAI Responses API instead of Chat Completions.
    #[arg(long, env = "OPENAI_RESPONSES_API", default_value = "true", action = clap::ArgAction::Set)]
    pub openai_responses_api: bool,

    // --- General App Args ---
    /// Optional path to a JSON file overriding the system prompt and title instruction.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    /// Host address and port for the WebSocket server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Optional port for the HTTP conversation API.
    #[arg(long, env = "HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Optional API Key required for clients to connect. If set, clients must sign their requests with it.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,
}

impl Args {
    pub fn effective_api_key(&self) -> Option<String> {
        if !self.chat_api_key.is_empty() {
            return Some(self.chat_api_key.clone());
        }
        std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())
    }
}
