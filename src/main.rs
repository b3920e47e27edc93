//! # lexrag CLI
//!
//! The `lexrag` binary stores legal documents and answers questions about
//! them.
//!
//! ## Usage
//!
//! ```bash
//! lexrag --config ./config/lexrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lexrag upload <path>` | Copy a PDF/DOCX into the storage directory |
//! | `lexrag files` | List stored documents |
//! | `lexrag ask <file> "<question>"` | Load a document and answer one question |
//! | `lexrag chat <file>` | Load a document and start an interactive chat |
//!
//! Inside `chat`: `/reset` forgets the conversation, `/tokens` shows the
//! token counter, `/load <file>` switches document, `/quit` exits.
//!
//! Logs go to stderr (`RUST_LOG`, or `--verbose` for debug); answers go to
//! stdout.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use lexrag::config::{self, Config};
use lexrag::persona::Language;
use lexrag::progress::ProgressMode;
use lexrag::session::{LoadReport, Session};
use lexrag::storage::FileStore;

/// lexrag: question answering over legal documents.
#[derive(Parser)]
#[command(
    name = "lexrag",
    about = "lexrag: retrieval-augmented question answering over legal documents",
    version,
    long_about = "lexrag extracts the text of a PDF or DOCX (with OCR for scanned PDFs), \
    indexes it in memory, and answers questions about it with a chat model, keeping the \
    conversation history across turns."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/lexrag.toml`. Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/lexrag.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Load progress on stderr: `off`, `human`, or `json`.
    /// Defaults to `human` when stderr is a terminal.
    #[arg(long, global = true)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a PDF or DOCX into the storage directory.
    ///
    /// Existing files are never overwritten; a timestamp suffix is added
    /// to the new copy instead.
    Upload {
        /// File to store.
        path: PathBuf,
    },

    /// List stored documents.
    Files,

    /// Load a document and answer a single question.
    Ask {
        /// Document path, or a file name inside the storage directory.
        file: String,

        /// The question.
        question: String,

        /// Answer language: `es` or `en` (default from config).
        #[arg(long)]
        language: Option<Language>,
    },

    /// Load a document and chat about it interactively.
    Chat {
        /// Document path, or a file name inside the storage directory.
        file: String,

        /// Answer language: `es` or `en` (default from config).
        #[arg(long)]
        language: Option<Language>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_or_default(&cli.config)?;
    let store = FileStore::new(&cfg.storage.dir);
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Upload { path } => {
            let saved = store.import(&path)?;
            println!("Saved {}", saved.display());
        }
        Commands::Files => {
            let files = store.list()?;
            if files.is_empty() {
                println!("No documents in {}.", store.dir().display());
            }
            for name in files {
                println!("{}", name);
            }
        }
        Commands::Ask {
            file,
            question,
            language,
        } => {
            let language = resolve_language(&cfg, language)?;
            let mut session = Session::from_config(&cfg)?.with_progress(progress.reporter());
            load(&mut session, &store, &file).await?;
            let answer = session.ask(&question, language.instruction()).await?;
            println!("{}", answer.text);
            println!();
            println!("tokens: {} (total {})", answer.usage, answer.total_tokens);
        }
        Commands::Chat { file, language } => {
            let language = resolve_language(&cfg, language)?;
            let mut session = Session::from_config(&cfg)?.with_progress(progress.reporter());
            load(&mut session, &store, &file).await?;
            run_chat(&mut session, &store, language).await?;
        }
    }

    Ok(())
}

fn resolve_language(cfg: &Config, flag: Option<Language>) -> Result<Language> {
    match flag {
        Some(language) => Ok(language),
        None => cfg.conversation.language.parse(),
    }
}

async fn load(session: &mut Session, store: &FileStore, file: &str) -> Result<LoadReport> {
    let path = store.resolve(file)?;
    let report = session
        .load_document(&path)
        .await
        .with_context(|| format!("Failed to load {}", path.display()))?;
    print_report(&report);
    Ok(report)
}

fn print_report(report: &LoadReport) {
    println!(
        "Loaded {} ({}, {}): {} segment(s), {} characters, {} chunk(s)",
        display_name(&report.source),
        report.format,
        report.method,
        report.segments,
        report.chars,
        report.chunks
    );
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One line of chat input.
#[derive(Debug, PartialEq, Eq)]
enum ChatCommand<'a> {
    Quit,
    Reset,
    Tokens,
    Load(&'a str),
    LoadUsage,
    Ask(&'a str),
}

impl<'a> ChatCommand<'a> {
    /// `line` is already trimmed and non-empty. Anything that is not an exact
    /// command is a question.
    fn parse(line: &'a str) -> Self {
        match line {
            "/quit" | "/exit" => Self::Quit,
            "/reset" => Self::Reset,
            "/tokens" => Self::Tokens,
            "/load" => Self::LoadUsage,
            _ => match line.strip_prefix("/load ") {
                Some(file) => Self::Load(file.trim()),
                None => Self::Ask(line),
            },
        }
    }
}

async fn run_chat(session: &mut Session, store: &FileStore, language: Language) -> Result<()> {
    let interactive = atty::is(atty::Stream::Stdin);
    if interactive {
        println!("Commands: /reset, /tokens, /load <file>, /quit");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        if interactive {
            use std::io::Write;
            print!("> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match ChatCommand::parse(line) {
            ChatCommand::Quit => break,
            ChatCommand::Reset => {
                session.reset_history();
                println!("Conversation cleared.");
            }
            ChatCommand::Tokens => println!("tokens: {}", session.tokens_used()),
            ChatCommand::LoadUsage => println!("usage: /load <file>"),
            ChatCommand::Load(file) => {
                // A failed load keeps the current document active.
                if let Err(e) = load(session, store, file).await {
                    eprintln!("Error: {:#}", e);
                }
            }
            ChatCommand::Ask(question) => match session.ask(question, language.instruction()).await {
                Ok(answer) => {
                    println!("{}", answer.text);
                    println!("[tokens: {}]", answer.total_tokens);
                }
                Err(e) => eprintln!("Error: {}", e),
            },
        }
    }
    Ok(())
}
