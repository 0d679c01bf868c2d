use slack_agent::agent::{GeminiClient, Runner, build_app};
use slack_agent::config::load_settings;
use slack_agent::error::Result;
use slack_agent::logging;
use slack_agent::session::InMemorySessionService;
use slack_agent::slack::{EventHandler, MessageProcessor, SlackClient};
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    logging::init_tracing();

    tracing::info!("🚀 Starting Slack Agent");

    let settings = load_settings()?;
    tracing::info!("✅ Configuration loaded");
    tracing::debug!(
        "Config: model={}, vertex_ai={}, profile={}, socket_mode={}",
        settings.model.model,
        settings.model.use_vertex_ai,
        settings.agent.profile,
        settings.slack.app_token.is_some()
    );

    let slack_client = Arc::new(SlackClient::new(settings.slack.clone())?);
    tracing::info!("Slack client created");

    let sessions = Arc::new(InMemorySessionService::new());
    let model = Arc::new(GeminiClient::new(&settings.model)?);

    let app = build_app(&settings, slack_client.clone())?;
    let runner = Runner::new(app, sessions, model).with_max_llm_calls(settings.agent.max_llm_calls);
    tracing::info!("Agent runner created");

    let message_processor = Arc::new(MessageProcessor::new(
        runner,
        slack_client.clone(),
        &settings.agent,
    ));

    let event_handler = EventHandler::new(slack_client, message_processor, settings.slack.port);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<String>(1);
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(signal_name) => {
                let _ = shutdown_tx.send(signal_name).await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
        }
    });

    let shutdown_result = tokio::select! {
        result = event_handler.start() => {
            tracing::info!("Event handler completed normally");
            result
        }
        Some(signal_name) = shutdown_rx.recv() => {
            tracing::info!(
                signal = %signal_name,
                "Received shutdown signal, stopping"
            );
            Ok(())
        }
    };

    tracing::info!("Application shutdown sequence complete");
    shutdown_result
}

/// Handles SIGINT (Ctrl+C), SIGTERM, and SIGQUIT on Unix systems
async fn wait_for_shutdown_signal() -> std::io::Result<String> {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigquit = signal(SignalKind::quit())?;

        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT (Ctrl+C)",
            _ = sigterm.recv() => "SIGTERM",
            _ = sigquit.recv() => "SIGQUIT",
        };
        tracing::debug!(signal = name, "Caught signal");
        Ok(name.to_string())
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        tracing::debug!("Caught Ctrl+C signal");
        Ok("Ctrl+C".to_string())
    }
}
