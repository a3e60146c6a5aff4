use anyhow::{Context, Result};
use clap::Parser;
use loqa_dictation::{
    create_router, AppState, Config, FileSource, FileSourceConfig, NatsTransport, SessionEvent,
    SessionManager, TranscriptSnapshot,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "loqa-dictation", version, about = "Push-to-talk dictation over a streaming STT service")]
struct Cli {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/loqa-dictation")]
    config: String,

    /// WAV file to use as the capture source (overrides audio.wav_path)
    #[arg(long)]
    wav: Option<PathBuf>,

    /// HTTP port (overrides service.http.port)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let mut source_config = match cfg.file_source_config() {
        Some(source_config) => source_config,
        None => {
            let path = cli
                .wav
                .clone()
                .context("No audio source configured: set audio.wav_path or pass --wav")?;
            FileSourceConfig {
                target_sample_rate: cfg.transcription.sample_rate,
                target_channels: cfg.transcription.channels,
                ..FileSourceConfig::new(path)
            }
        }
    };
    if let Some(path) = cli.wav {
        source_config.path = path;
    }

    info!("Audio source: {}", source_config.path.display());
    info!("Transcription service: {}", cfg.transcription.nats_url);

    let manager = SessionManager::new(
        cfg.session_config(),
        Arc::new(FileSource::new(source_config)),
        Arc::new(NatsTransport::new(cfg.transport_config())),
    );

    tokio::spawn(render(manager.clone()));

    let app = create_router(AppState::new(manager.clone()));
    let addr = format!(
        "{}:{}",
        cfg.service.http.bind,
        cli.port.unwrap_or(cfg.service.http.port)
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP control API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
        .context("HTTP server failed")?;

    info!("Shutting down");
    manager.shutdown();

    Ok(())
}

/// Print transcript changes to the terminal: finals on their own line,
/// the interim fragment overwritten in place
async fn render(manager: SessionManager) {
    let mut events = manager.subscribe();
    let mut printed = 0usize;

    loop {
        match events.recv().await {
            Ok(SessionEvent::TranscriptChanged(transcript)) => {
                print_transcript(&transcript, &mut printed);
            }
            Ok(SessionEvent::StatusChanged(status)) => {
                info!(
                    "Status: {:?} (capturing: {}){}",
                    status.status,
                    status.is_capturing,
                    status
                        .last_error
                        .map(|e| format!(" last error: {}", e))
                        .unwrap_or_default()
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Renderer skipped {} events, resyncing", skipped);
                print_transcript(&manager.transcript(), &mut printed);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_transcript(transcript: &TranscriptSnapshot, printed: &mut usize) {
    if transcript.committed.len() < *printed {
        *printed = 0; // cleared
    }
    let fresh = transcript.committed.get(*printed..).unwrap_or("").trim();
    if !fresh.is_empty() {
        println!("\r\x1b[2K{}", fresh);
        *printed = transcript.committed.len();
    }
    if !transcript.interim.is_empty() {
        print!("\r\x1b[2K{}", transcript.interim);
        std::io::stdout().flush().ok();
    }
}
