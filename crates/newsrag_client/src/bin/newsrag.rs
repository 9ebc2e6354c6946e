//! newsrag: terminal front-end for the NewsRAG question-answering service.
//! Streams answers to stdout as they arrive, runs search/expand lookups,
//! uploads query files and downloads stored documents.

use clap::{Parser, Subcommand};
use newsrag_client::compose::selectable_references;
use newsrag_client::config::{self, Config};
use newsrag_client::render::line_breaks_to_newlines;
use newsrag_client::{Client, Controller, LookupKind, LookupOutcome, RefField, SessionUpdate};
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "newsrag")]
#[command(about = "Ask the NewsRAG service questions, search documents and expand concepts", long_about = None)]
struct Cli {
    /// Config file (default: ~/.newsrag/config.yaml)
    #[arg(long, global = true, env = "NEWSRAG_CONFIG")]
    config: Option<PathBuf>,

    /// Concept reference appended to the query (repeatable)
    #[arg(long = "concept", value_name = "ID", global = true)]
    concepts: Vec<String>,

    /// Document reference appended to the doc list (repeatable)
    #[arg(long = "doc", value_name = "ID", global = true)]
    docs: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream an answer; without a question, asks one per line of stdin
    Ask {
        question: Vec<String>,
        /// Print the finalized record instead of the raw token stream
        #[arg(long)]
        html: bool,
    },
    /// Search documents
    Search {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Expand concept terms
    Expand {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Search documents similar to a file
    Upload { file: PathBuf },
    /// Download a stored document
    Download {
        name: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

fn load_config(flag: Option<&Path>) -> Result<Config, config::ConfigError> {
    // 1. --config <path> flag or NEWSRAG_CONFIG
    if let Some(path) = flag {
        return config::load(path);
    }
    // 2. Default path (~/.newsrag/config.yaml), if any
    match config::default_config_path() {
        Some(path) => config::load_or_default(&path),
        None => Ok(Config::default()),
    }
}

fn read_questions(words: Vec<String>) -> Vec<String> {
    if !words.is_empty() {
        return vec![words.join(" ")];
    }
    let questions: Vec<String> = io::stdin()
        .lock()
        .lines()
        .map_while(Result::ok)
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    if questions.is_empty() {
        // Submitted as-is so the controller reports the empty query.
        vec![String::new()]
    } else {
        questions
    }
}

fn with_references(controller: &mut Controller, text: String, concepts: &[String]) {
    controller.page_mut().query = text;
    for concept in concepts {
        controller.append_reference(RefField::Query, concept, true);
    }
}

async fn ask(
    controller: &mut Controller,
    client: &Client,
    cfg: &Config,
    cli_concepts: &[String],
    questions: Vec<String>,
    html: bool,
) -> Result<(), Box<dyn Error>> {
    for question in questions {
        with_references(controller, question, cli_concepts);
        let record = controller
            .chat(client, cfg.session.idle_timeout(), |update| {
                if let SessionUpdate::Token(token) = update {
                    if !html {
                        let mut out = io::stdout();
                        let _ = write!(out, "{}", line_breaks_to_newlines(token));
                        let _ = out.flush();
                    }
                }
            })
            .await?;
        if html {
            println!("{}", record);
        } else {
            println!();
        }
    }
    Ok(())
}

fn print_lookup(outcome: &LookupOutcome) -> Result<(), Box<dyn Error>> {
    match outcome {
        LookupOutcome::Body(body) => {
            println!("{}", body);
            let refs = selectable_references(body);
            if !refs.is_empty() {
                eprintln!("selectable: {}", refs.join(" "));
            }
            Ok(())
        }
        LookupOutcome::Failed(reason) => Err(format!("lookup failed: {}", reason).into()),
    }
}

async fn run(cli: Cli, cfg: Config) -> Result<(), Box<dyn Error>> {
    let client = Client::from_config(&cfg.server)?;
    let mut controller = Controller::new();
    for doc in &cli.docs {
        controller.append_reference(RefField::Docs, doc, true);
    }

    match cli.command {
        Command::Ask { question, html } => {
            let questions = read_questions(question);
            ask(&mut controller, &client, &cfg, &cli.concepts, questions, html).await
        }
        Command::Search { query } => {
            with_references(&mut controller, query.join(" "), &cli.concepts);
            let outcome = controller.lookup(&client, LookupKind::Search).await?;
            print_lookup(&outcome)
        }
        Command::Expand { query } => {
            with_references(&mut controller, query.join(" "), &cli.concepts);
            let outcome = controller.lookup(&client, LookupKind::Expand).await?;
            print_lookup(&outcome)
        }
        Command::Upload { file } => {
            controller.toggle_input();
            controller.page_mut().query = file.to_string_lossy().into_owned();
            let outcome = controller.lookup(&client, LookupKind::Upload).await?;
            print_lookup(&outcome)
        }
        Command::Download { name, output } => {
            let dest = output.unwrap_or_else(|| {
                Path::new(&name)
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("download"))
            });
            let written = client.download(&name, &dest).await?;
            eprintln!("{} bytes written to {}", written, dest.display());
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let cfg = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli, cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
