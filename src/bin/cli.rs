//! CLI binary for seva.

use clap::{Parser, Subcommand};
use seva::capture::MicRecorder;
use seva::gateway::{AgentGateway, HttpAgentGateway};
use seva::playback::{CpalPlayer, PlaybackDriver};
use seva::trace::TraceStep;
use seva::{Phase, SessionController, SessionEvent, UserCommand, Utterance, VoiceConfig};
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{broadcast, mpsc, watch};
use tracing_subscriber::EnvFilter;

/// Seva: voice client for a remote conversational service agent.
#[derive(Parser)]
#[command(name = "seva", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Hold a voice conversation with the agent.
    Chat,

    /// Send one text utterance and print (and play) the reply.
    Say {
        /// The utterance text.
        text: String,
    },

    /// List available audio devices.
    Devices,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("seva=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if let Some(ref path) = cli.config {
        VoiceConfig::from_file(path)?
    } else {
        VoiceConfig::default()
    };

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(config).await,
        Command::Say { text } => run_say(config, text).await,
        Command::Devices => list_devices(),
    }
}

async fn run_chat(config: VoiceConfig) -> anyhow::Result<()> {
    println!("seva v{}", env!("CARGO_PKG_VERSION"));
    println!("agent: {}", config.gateway.base_url);
    println!("Press Enter to start or stop listening, Ctrl-D to quit.");

    let controller = SessionController::from_config(config)?;
    let events = controller.subscribe();
    let cancel = controller.cancel_token();

    let (phase_tx, phase_rx) = watch::channel(Phase::Idle);
    tokio::spawn(print_events(events, phase_tx));

    let (cmd_tx, cmd_rx) = mpsc::channel::<UserCommand>(8);
    let controller_task = tokio::spawn(controller.run(cmd_rx));

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(_line) = lines.next_line().await? {
        let command = match *phase_rx.borrow() {
            Phase::Idle => UserCommand::Start,
            Phase::Listening => UserCommand::Stop,
            _ => {
                println!("(busy, wait for the current reply)");
                continue;
            }
        };
        if cmd_tx.send(command).await.is_err() {
            break;
        }
    }

    drop(cmd_tx);
    cancel.cancel();
    let _ = controller_task.await;
    Ok(())
}

/// Console sink: prints every session event and tracks the current phase
/// so the prompt loop knows whether Enter means start or stop.
async fn print_events(
    mut events: broadcast::Receiver<SessionEvent>,
    phase_tx: watch::Sender<Phase>,
) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Phase(phase)) => {
                let _ = phase_tx.send(phase);
            }
            Ok(SessionEvent::Status(status)) => println!("· {status}"),
            Ok(SessionEvent::Cleared) => {}
            Ok(SessionEvent::Transcript(text)) => println!("You: {text}"),
            Ok(SessionEvent::Reply(text)) => println!("Agent: {text}"),
            Ok(SessionEvent::Trace(steps)) => print_trace(&steps),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                eprintln!("(display fell behind, skipped {n} events)");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_trace(steps: &[TraceStep]) {
    for step in steps {
        println!("  [{}] {}", step.kind().label(), step.text);
    }
}

async fn run_say(config: VoiceConfig, text: String) -> anyhow::Result<()> {
    let gateway = HttpAgentGateway::new(&config.gateway)?;
    let reply = gateway.send(Utterance::Text(text)).await?;

    if let Some(transcript) = &reply.transcript {
        println!("You: {transcript}");
    }
    println!("Agent: {}", reply.reply_text);
    print_trace(&seva::trace::classify_trace(reply.trace));

    if let Some(audio) = reply.reply_audio {
        let mut player = CpalPlayer::new(&config.audio);
        player.play(audio).await?;
    }
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in MicRecorder::list_input_devices()? {
        println!("  {name}");
    }
    println!("Output devices:");
    for name in CpalPlayer::list_output_devices()? {
        println!("  {name}");
    }
    Ok(())
}
