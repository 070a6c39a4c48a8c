use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tracing::info;

use crate::agent::AgentRunner;
use crate::callbacks::TranslateCallbacks;
use crate::config::AppConfig;
use crate::error::{AguiError, Result};
use crate::runner::{
    DefaultUserIdResolver, ProtocolRunner, Runner, UserIdResolver, DEFAULT_CHANNEL_CAPACITY,
};
use crate::service::{sse_service_factory, ServiceFactory};
use crate::translator::{default_translator_factory, TranslatorFactory};

/// An AG-UI endpoint backed by one agent runner.
#[derive(Clone)]
pub struct Server {
    path: String,
    router: Router,
}

impl Server {
    pub fn builder(agent: Arc<dyn AgentRunner>) -> ServerBuilder {
        ServerBuilder::new(agent)
    }

    pub fn from_config(agent: Arc<dyn AgentRunner>, config: &AppConfig) -> Result<Self> {
        Self::builder(agent)
            .path(config.server.path.clone())
            .user_id_resolver(Arc::new(DefaultUserIdResolver::new(
                config.runner.default_user_id.clone(),
            )))
            .channel_capacity(config.runner.channel_capacity)
            .build()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, path = %self.path, "serving AG-UI endpoint");
        axum::serve(listener, self.router.into_make_service())
            .await
            .map_err(|err| AguiError::Protocol(format!("server error: {err}")))?;
        Ok(())
    }
}

pub struct ServerBuilder {
    agent: Arc<dyn AgentRunner>,
    path: String,
    translator_factory: TranslatorFactory,
    user_id_resolver: Arc<dyn UserIdResolver>,
    callbacks: TranslateCallbacks,
    service_factory: ServiceFactory,
    channel_capacity: usize,
}

impl ServerBuilder {
    fn new(agent: Arc<dyn AgentRunner>) -> Self {
        Self {
            agent,
            path: "/".into(),
            translator_factory: default_translator_factory(),
            user_id_resolver: Arc::new(DefaultUserIdResolver::default()),
            callbacks: TranslateCallbacks::default(),
            service_factory: sse_service_factory(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn translator_factory(mut self, factory: TranslatorFactory) -> Self {
        self.translator_factory = factory;
        self
    }

    pub fn user_id_resolver(mut self, resolver: Arc<dyn UserIdResolver>) -> Self {
        self.user_id_resolver = resolver;
        self
    }

    pub fn translate_callbacks(mut self, callbacks: TranslateCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Replaces the HTTP transport.
    pub fn service_factory(mut self, factory: ServiceFactory) -> Self {
        self.service_factory = factory;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn build(self) -> Result<Server> {
        if !self.path.starts_with('/') {
            return Err(AguiError::Config(format!(
                "endpoint path must start with '/': {}",
                self.path
            )));
        }
        if self.channel_capacity == 0 {
            return Err(AguiError::Config(
                "channel capacity must be at least 1".into(),
            ));
        }

        let runner: Arc<dyn ProtocolRunner> = Arc::new(
            Runner::new(self.agent)
                .with_translator_factory(self.translator_factory)
                .with_user_id_resolver(self.user_id_resolver)
                .with_translate_callbacks(self.callbacks)
                .with_channel_capacity(self.channel_capacity),
        );
        let router = (self.service_factory)(Some(runner), &self.path);
        Ok(Server {
            path: self.path,
            router,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::EchoRunner;

    #[test]
    fn rejects_relative_paths() {
        let err = Server::builder(Arc::new(EchoRunner))
            .path("agui")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, AguiError::Config(msg) if msg.contains("agui")));
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(Server::builder(Arc::new(EchoRunner))
            .channel_capacity(0)
            .build()
            .is_err());
    }

    #[test]
    fn takes_path_from_config() {
        let mut config = AppConfig::default();
        config.server.path = "/agui".into();
        let server = Server::from_config(Arc::new(EchoRunner), &config).unwrap();
        assert_eq!(server.path(), "/agui");
    }

    #[test]
    fn custom_service_factory_receives_runner_and_path() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let captured = Arc::clone(&seen);
        let factory: ServiceFactory = Arc::new(
            move |runner: Option<Arc<dyn ProtocolRunner>>, path: &str| {
                *captured.lock().unwrap() = Some((runner.is_some(), path.to_string()));
                Router::new()
            },
        );

        Server::builder(Arc::new(EchoRunner))
            .path("/custom")
            .service_factory(factory)
            .build()
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), Some((true, "/custom".to_string())));
    }
}
