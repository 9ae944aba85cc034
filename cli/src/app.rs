//! Dependency wiring
//!
//! Builds the layers bottom-up from a validated [`FileConfig`]:
//! registry → supervisor → dispatcher → reasoning loop → fallback chain.

use anyhow::{Context, Result};
use concierge_application::{
    CapabilityRegistry, CompletionGateway, ConversationLogger, HandleMessageUseCase,
    NoConversationLogger, RunTurnUseCase, ToolAvailability, ToolDispatcher, ToolInvoker,
};
use concierge_infrastructure::{
    ConnectionSupervisor, FileConfig, JsonlConversationLogger, OpenAiGateway,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct App {
    pub supervisor: Arc<ConnectionSupervisor>,
    pub handler: HandleMessageUseCase,
    shutdown_timeout: Duration,
}

impl App {
    /// Wire every layer and start the tool server connections.
    ///
    /// Returns as soon as the connection tasks are spawned; servers become
    /// ready in the background.
    pub fn start(config: &FileConfig) -> Result<Self> {
        let params = config.agent.to_execution_params();
        let settings = config.connection.to_connection_settings();
        // Every connection gets its own grace period, plus slack for the last close.
        let shutdown_timeout = settings.shutdown_grace + Duration::from_secs(1);

        let registry = Arc::new(CapabilityRegistry::new());
        let supervisor = Arc::new(ConnectionSupervisor::new(Arc::clone(&registry), settings));
        let started = supervisor.initialize(&config.server_descriptors());
        info!(servers = started, "Tool server connections starting");

        let llm = config.llm.to_openai_settings();
        if llm.api_key.is_none() {
            warn!(
                env = %config.llm.api_key_env,
                "No API key in the environment; requests are sent unauthenticated"
            );
        }
        info!(model = %llm.model, base_url = %llm.base_url, "Completion gateway configured");
        let gateway: Arc<dyn CompletionGateway> =
            Arc::new(OpenAiGateway::new(llm).context("failed to build completion gateway")?);

        let logger: Arc<dyn ConversationLogger> = match config.logging.conversation_log_path() {
            Some(path) => match JsonlConversationLogger::new(&path) {
                Some(logger) => {
                    info!(path = %path.display(), "Conversation log enabled");
                    Arc::new(logger)
                }
                None => Arc::new(NoConversationLogger),
            },
            None => Arc::new(NoConversationLogger),
        };

        let availability: Arc<dyn ToolAvailability> = supervisor.clone();
        let invoker: Arc<dyn ToolInvoker> = supervisor.clone();
        let dispatcher = Arc::new(ToolDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&availability),
            invoker,
            Arc::new(config.permissions.to_gate()),
            params.clone(),
        ));
        let run_turn =
            RunTurnUseCase::new(Arc::clone(&gateway), registry, dispatcher, params.clone())
                .with_conversation_logger(Arc::clone(&logger));
        let handler = HandleMessageUseCase::new(
            run_turn,
            gateway,
            availability,
            config.persona.to_persona(),
            params,
        )
        .with_conversation_logger(logger);

        Ok(Self {
            supervisor,
            handler,
            shutdown_timeout,
        })
    }

    pub async fn shutdown(&self) {
        self.supervisor.shutdown(self.shutdown_timeout).await;
    }
}
