pub mod api;
pub mod auth;
pub mod websocket;

use crate::session::SessionController;
use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    controller: Arc<SessionController>,
    api_key: Option<String>,
    http_port: Option<u16>,
}

impl Server {
    pub fn new(
        addr: String,
        controller: Arc<SessionController>,
        api_key: Option<String>,
        http_port: Option<u16>,
    ) -> Self {
        let api_key = api_key.filter(|k| !k.trim().is_empty());

        if api_key.is_some() {
            info!("Server configured with API Key authentication.");
        } else {
            warn!("Server configured WITHOUT API Key authentication. Connections are open.");
        }

        Self {
            addr,
            controller,
            api_key,
            http_port,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if let Some(http_port) = self.http_port {
            self.start_http_server(http_port).await?;
        }

        self.start_ws_server().await?;

        Ok(())
    }

    async fn start_http_server(&self, http_port: u16) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(
            http_port,
            Arc::clone(&self.controller),
            self.api_key.clone(),
        ).await
    }

    async fn start_ws_server(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        websocket::start_ws_server(
            &self.addr,
            Arc::clone(&self.controller),
            self.api_key.clone(),
        ).await
    }
}
