//! Kestrel voice assistant entry point.
//!
//! Builds the default configuration, opens the audio devices, wires up the
//! reference adapter implementations (scripted ASR, sink TTS, in-memory
//! memory), and runs the conversation coordinator until interrupted.

use kestrel::audio::capture::AudioCapture;
use kestrel::audio::playback::AudioPlayer;
use kestrel::config::AssistantConfig;
use kestrel::pipeline::coordinator::ConversationCoordinator;
use kestrel::rag::InMemoryMemoryService;
use kestrel::tools::builtin::{DateTool, TimeTool};
use kestrel::tts::SinkTtsEngine;
use kestrel::AssistantError;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("kestrel starting");

    let config = AssistantConfig::default();
    config.validate().map_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
        anyhow::anyhow!("invalid configuration: {e}")
    })?;

    let capture = AudioCapture::open(&config.audio).map_err(|e| {
        tracing::error!(error = %e, "audio capture unavailable, exiting");
        anyhow::anyhow!("{e}")
    })?;
    let mut player = AudioPlayer::open(&config.audio).map_err(|e| {
        tracing::error!(error = %e, "audio playback unavailable, exiting");
        anyhow::anyhow!("{e}")
    })?;

    // ASR/TTS are out-of-scope external collaborators (spec-level non-goal);
    // the in-process reference implementations stand in until a concrete
    // runtime is wired through the `AsrEngine`/`TtsEngine` traits.
    let asr = Box::new(kestrel::asr::ScriptedAsrEngine::new(Vec::new()));
    let tts = Box::new(SinkTtsEngine::new(config.audio.sample_rate));
    let memory = Box::new(InMemoryMemoryService::new());

    let mut coordinator = ConversationCoordinator::new(config, asr, tts, memory);
    register_builtin_tools(&mut coordinator);

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_cancel.cancel();
        }
    });

    let result = coordinator.run(&capture, &mut player, cancel).await;
    match &result {
        Ok(()) => tracing::info!("kestrel shut down cleanly"),
        Err(AssistantError::AudioDeviceUnavailable(msg)) => {
            tracing::error!(%msg, "fatal audio device failure");
        }
        Err(e) => tracing::error!(error = %e, "kestrel exited with error"),
    }
    result.map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(())
}

fn register_builtin_tools(coordinator: &mut ConversationCoordinator) {
    let registry = coordinator.tools_mut();
    registry.register_tool(Box::new(TimeTool));
    registry.register_tool(Box::new(DateTool));
}
