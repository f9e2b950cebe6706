pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;

use cli::Args;
use log::info;
use server::Server;
use session::SessionController;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("HTTP API Port: {:?}", args.http_port);
    info!("History Store Type: {}", args.history_type);
    if args.history_type.eq_ignore_ascii_case("file") {
        info!("History Directory: {}", args.history_dir);
    } else {
        info!("History Store Host: {}", args.history_host);
    }
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Models: {}", args.chat_models.join(", "));
    info!("Default Temperature: {}", args.chat_temperature);
    info!("Title Model: {}", args.title_model);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("-------------------------");

    let controller = Arc::new(SessionController::from_args(&args).await?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, controller, args.server_api_key.clone(), args.http_port);
    server.run().await?;

    Ok(())
}
