use std::time::Duration;

use anyhow::{Context, Result};
use audio_suite::{
    create_router, AppState, AudioBackendConfig, AudioBackendFactory, Config, GeminiLiveClient,
    SessionController, SessionHandle,
};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(name = "audio-suite", about = "Real-time voice conversation with a live model endpoint")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/audio-suite")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP control API
    Serve,
    /// Run one conversation for a fixed time and print the transcript
    Converse {
        #[arg(short, long, default_value_t = 30)]
        seconds: u64,
    },
}

fn build_controller(cfg: &Config) -> Result<SessionController> {
    let capture = AudioBackendFactory::create(cfg.audio.source()?, AudioBackendConfig::default())?;
    let output = AudioBackendFactory::create_output(cfg.audio.sink()?)?;
    let connector = GeminiLiveClient::new(&cfg.live.endpoint, &cfg.live.api_key);

    Ok(SessionController::new(
        cfg.session_config(),
        capture,
        output,
        Box::new(connector),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Live endpoint: {} (model {}, voice {})", cfg.live.endpoint, cfg.live.model, cfg.live.voice);
    info!("Audio input: {:?}", cfg.audio.source()?);
    info!("Audio output: {:?}", cfg.audio.sink()?);

    let (session, task) = SessionHandle::spawn(build_controller(&cfg)?);

    match cli.command {
        Command::Serve => {
            let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("HTTP server listening on {}", addr);

            axum::serve(listener, create_router(AppState::new(session.clone())))
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Shutdown requested");
                })
                .await
                .context("HTTP server failed")?;
        }
        Command::Converse { seconds } => {
            session.start().await.context("Failed to start live session")?;

            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }

            let stats = session.stop().await?;
            let transcript = session.transcript().await?;

            println!();
            for turn in &transcript.turns {
                if !turn.user.is_empty() {
                    println!("You: {}", turn.user);
                }
                if !turn.model.is_empty() {
                    println!("AI:  {}", turn.model);
                }
            }
            if let Some(error) = &stats.last_error {
                println!("Session ended with error: {}", error);
            }
            info!(
                "Frames sent: {}, dropped: {}, turns: {}",
                stats.frames_sent, stats.frames_dropped, stats.turns
            );
        }
    }

    session.shutdown().await?;
    task.await.context("Session loop panicked")?;

    Ok(())
}
