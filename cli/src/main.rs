use clap::Parser;
use clap_derive::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use arbor_core::{
    ContextId, ConversationBackend, ConversationSession, MemoryBackend, ModelId, NoticeLevel,
    SessionEvent, SessionOptions, TreeStore,
};
use config::{load_env_file, PathManager, Settings};

mod commands;
mod logging;
mod render;

use commands::{Command, CommandResult};

#[derive(Parser, Debug)]
#[command(author, version, about = "Navigate and branch a conversation tree", long_about = None)]
struct Args {
    /// Conversation context to open
    #[arg(long, env = "ARBOR_CONTEXT", default_value = "default")]
    context: String,

    /// Comma-separated model viewports (overrides settings.toml)
    #[arg(long, env = "ARBOR_MODELS", value_delimiter = ',')]
    models: Vec<String>,

    /// Node ceiling per conversation (overrides settings.toml)
    #[arg(long, env = "ARBOR_MAX_TURNS")]
    max_turns: Option<usize>,

    /// Start with messages from earlier turns shown
    #[arg(long)]
    show_previous: bool,

    /// Also write logs to stderr
    #[arg(long, short)]
    tracing: bool,

    /// Custom data directory for logs and settings
    #[arg(long, env = "ARBOR_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

impl Args {
    fn session_options(&self, settings: &Settings) -> SessionOptions {
        let mut options = SessionOptions::from(settings);
        if !self.models.is_empty() {
            options.models = self.models.iter().map(|m| ModelId::from(m.as_str())).collect();
        }
        if self.max_turns.is_some() {
            options.max_turns = self.max_turns;
        }
        options.show_previous |= self.show_previous;
        options
    }
}

fn print_notices(rx: &mut mpsc::UnboundedReceiver<(ContextId, SessionEvent)>) {
    while let Ok((_, event)) = rx.try_recv() {
        if let SessionEvent::Notice(notice) = event {
            let prefix = match notice.level {
                NoticeLevel::Info => "note",
                NoticeLevel::Warning => "warning",
                NoticeLevel::Error => "error",
            };
            println!("{prefix}: {}", notice.text);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env_file();
    let args = Args::parse();

    if let Some(dir) = &args.data_dir {
        PathManager::set_data_dir(dir.clone());
    }
    let settings = Settings::load();
    let _log_guard = logging::init_logging(settings.log_filter.as_deref(), args.tracing);

    let options = args.session_options(&settings);
    tracing::info!(context = %args.context, models = ?options.models, "Starting arbor");

    let backend: Arc<dyn ConversationBackend> = Arc::new(MemoryBackend::new());
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let session = ConversationSession::new(
        ContextId::from(args.context.as_str()),
        backend,
        Arc::new(TreeStore::new()),
        options,
    )
    .with_events(event_tx);

    if let Err(e) = session.open().await {
        tracing::debug!(error = %e, "Opened with errors");
    }
    print_notices(&mut event_rx);

    println!();
    println!(
        "Viewports: {}",
        session
            .models()
            .iter()
            .map(ModelId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Type /help for commands, Ctrl+D or /quit to exit.");
    println!();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("{}> ", session.active_model());
        io::stdout().flush()?;

        let line = match lines.next() {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                eprintln!("Error reading input: {}", e);
                break;
            }
            None => {
                println!();
                println!("Goodbye!");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(err) => {
                println!("{}", err);
                println!();
                continue;
            }
        };

        let result = command.execute(&session).await;
        // failures are reported through notices
        print_notices(&mut event_rx);
        match result {
            Ok(CommandResult::Exit) => break,
            Ok(CommandResult::Continue) => {}
            Err(e) => tracing::debug!(error = %e, "Command failed"),
        }
        println!();
    }

    tracing::info!(messages = session.message_count(), "Exiting");
    Ok(())
}
