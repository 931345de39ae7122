use std::sync::Arc;

use anyhow::Context;
use interview_coach::avatar::{AppMessageRelay, Conversation, TavusClient, connect_with_fallback};
use interview_coach::config::{AvatarConfig, InterviewConfig};
use interview_coach::interview::{SessionController, TemplateQuestionSource, interview_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = InterviewConfig::from_env();
    config.validate()?;

    // Avatar conversation; a mock one when no provider key is configured
    let conversation = match AvatarConfig::from_env() {
        Some(avatar_config) => connect_with_fallback(&TavusClient::new(avatar_config)).await,
        None => {
            tracing::warn!("TAVUS_API_KEY not set, using mock avatar conversation");
            Conversation::mock()
        }
    };

    if conversation.is_mock() {
        tracing::info!("Avatar running against a mock conversation");
    }

    eprintln!("🎤 Interview Coach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Conversation: {}", conversation.conversation_url);
    eprintln!("   Session WS: ws://0.0.0.0:{}/ws", config.bind_port);
    eprintln!("   Session API: http://0.0.0.0:{}/api/session", config.bind_port);

    let relay = AppMessageRelay::new(config.event_capacity);
    let controller = Arc::new(
        SessionController::new(Arc::new(TemplateQuestionSource::new()), &config)
            .with_transport(relay.clone(), conversation),
    );

    let app = interview_routes(controller, relay);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.bind_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.bind_port))?;
    tracing::info!(port = config.bind_port, "Interview server started");
    axum::serve(listener, app).await?;

    Ok(())
}
