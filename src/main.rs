use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use portal_engine::analytics::HttpAnalyticsSink;
use portal_engine::config::{EndpointConfig, PortalConfig};
use portal_engine::intelligence::HttpIntelligence;
use portal_engine::pdf::HttpPdfRenderer;
use portal_engine::portal::{PortalController, PortalDeps};
use portal_engine::session::{InteractionMode, Phase, PrivacyMode, Role};
use portal_engine::speech::{UnsupportedCapture, UnsupportedSynthesizer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let endpoints = EndpointConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export PORTAL_API_BASE=https://example.com/api");
        std::process::exit(1);
    });

    eprintln!("🧭 Portal Engine v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: {}", endpoints.base_url);
    eprintln!("   Type a message and press Enter.");
    eprintln!("   /start [confidential] to begin, /pdf to download, /reset, /quit\n");

    let config = PortalConfig::default();
    let deps = PortalDeps {
        intelligence: Arc::new(HttpIntelligence::new(endpoints.clone())),
        // The CLI runs in text mode; speech adapters are platform seams.
        synthesizer: Arc::new(UnsupportedSynthesizer),
        capture: Arc::new(UnsupportedCapture),
        analytics: Arc::new(HttpAnalyticsSink::new(endpoints.clone())),
        pdf: Arc::new(HttpPdfRenderer::new(endpoints)),
    };
    let controller = PortalController::new(config, deps);
    controller.set_mode(InteractionMode::Text).await;

    let stdin = tokio::io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();

    eprint!("> ");
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            eprint!("> ");
            continue;
        }
        match line {
            "/quit" | "/exit" => break,
            "/reset" => {
                controller.reset().await;
                eprintln!("Session ended.");
            }
            "/start" | "/start confidential" => {
                let privacy = if line.ends_with("confidential") {
                    PrivacyMode::Confidential
                } else {
                    PrivacyMode::OnTheRecord
                };
                controller.start_session(privacy).await;
                eprintln!("Session started ({privacy:?}). What brings you here?");
            }
            "/pdf" => match controller.request_pdf().await {
                Ok(document) => {
                    tokio::fs::write(&document.filename, &document.bytes).await?;
                    eprintln!("Saved {}", document.filename);
                }
                Err(e) => eprintln!("{e}"),
            },
            _ => {
                let state = controller.state().await;
                if state.session.is_none() {
                    eprintln!("No active session. Use /start first.");
                    eprint!("> ");
                    continue;
                }
                controller.submit_text(line).await;
                let state = controller.state().await;
                if let Some(error) = &state.error {
                    eprintln!("⚠️  {error}");
                } else if let Some(reply) = state
                    .session
                    .as_ref()
                    .and_then(|s| s.messages.iter().rev().find(|m| m.role == Role::Assistant))
                {
                    println!("\n{}\n", reply.content);
                }
                if state.phase == Phase::PlanReady {
                    eprintln!("✅ Plan ready. /pdf to download it.");
                }
            }
        }
        eprint!("> ");
    }

    controller.reset().await;
    Ok(())
}
