use anyhow::{Context, Result};
use coach::integration::{CoachConfig, OrchestratorBuilder, OrchestratorEvent, OrchestratorHandle};
use coach::llm::HttpChatClient;
use coach::speech::{AlwaysGrant, ConsoleRecognizer, ConsoleSynthesizer};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = concat!(
    "commands: /ack /mic /mute /prompt <text> /reset /say <text> /quit ",
    "(anything else is spoken)"
);

fn load_config() -> Result<CoachConfig> {
    if let Some(path) = std::env::args().nth(1) {
        return CoachConfig::load(&path).with_context(|| format!("loading {}", path));
    }
    match CoachConfig::default_path() {
        Some(path) if path.exists() => {
            CoachConfig::load(&path).with_context(|| format!("loading {}", path.display()))
        }
        _ => Ok(CoachConfig::default()),
    }
}

fn print_events(handle: OrchestratorHandle) {
    let events = handle.event_receiver();
    std::thread::spawn(move || {
        while let Ok(event) = events.recv() {
            match event {
                OrchestratorEvent::StateChanged(state) => println!("[{}]", state),
                OrchestratorEvent::UserTurn(text) => println!("you> {}", text),
                OrchestratorEvent::AssistantTurn { latency_ms, fallback, .. } => {
                    info!(latency_ms, fallback, "Reply received");
                }
                OrchestratorEvent::PermissionDenied | OrchestratorEvent::CaptureFailed(_) => {
                    if let Some(message) = handle.snapshot().error {
                        println!("! {}", message);
                    }
                }
                OrchestratorEvent::HistoryReset => println!("(conversation reset)"),
                OrchestratorEvent::Shutdown => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coach=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting career coach");

    let config = load_config()?;
    let recognizer = Arc::new(ConsoleRecognizer::new());
    let chat = Arc::new(HttpChatClient::new(&config.llm)?);
    info!(endpoint = chat.endpoint(), "Using coach backend");

    let (orchestrator, handle) = OrchestratorBuilder::new()
        .with_config(config)
        .with_recognizer(recognizer.clone())
        .with_synthesizer(Arc::new(ConsoleSynthesizer::default()))
        .with_chat(chat)
        .with_permission(Arc::new(AlwaysGrant))
        .build()?;
    let task = orchestrator.start();
    print_events(handle.clone());

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "" => continue,
            "/ack" => handle.acknowledge()?,
            "/mic" => handle.request_microphone()?,
            "/mute" => handle.toggle_mute()?,
            "/prompt" => handle.set_system_prompt(rest)?,
            "/reset" => handle.reset_conversation()?,
            "/say" => handle.submit_text(rest)?,
            "/quit" => break,
            "/help" => println!("{}", HELP),
            _ if command.starts_with('/') => println!("unknown command; {}", HELP),
            _ => {
                if !recognizer.dictate(line) {
                    warn!(state = %handle.state(), "Not listening; use /mute to start talking");
                }
            }
        }
    }

    handle.shutdown()?;
    task.await.context("orchestrator task failed")?;
    Ok(())
}
