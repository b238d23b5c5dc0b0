mod config;
mod db;
mod handlers;
mod models;
mod server;
mod share;
mod sheets;
mod votes;
mod widget;

use clap::{Parser, Subcommand, ValueEnum};
use handlers::AppState;
use log::{error, info};
use reqwest::Url;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use config::SheetsConfig;
use db::Database;
use server::ServerConfig;
use share::MatchResult;
use sheets::SheetsClient;
use votes::{SheetVoteStore, VoteError, VoteStore};
use widget::{FileFlag, HttpVoteApi, VoteOutcome, VoteWidget};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "ready-vote", version, about = "Ready to China vote counter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// Two cells in a Google spreadsheet (read-then-write)
    Sheets,
    /// Local SQLite table with atomic increments
    Sqlite,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the vote API
    Serve {
        #[arg(short = 'H', long, default_value = "127.0.0.1", env = "READY_VOTE_HOST")]
        host: String,
        #[arg(short, long, default_value_t = 8080, env = "READY_VOTE_PORT")]
        port: u16,
        #[arg(long, value_enum, default_value_t = StoreKind::Sheets)]
        store: StoreKind,
    },
    /// Set the SQLite counter to a starting value
    Seed { count: u64 },
    /// Print the current vote count
    Count {
        #[arg(long, default_value = widget::DEFAULT_API, env = "READY_VOTE_API")]
        api: String,
    },
    /// Count me in (once per flag file)
    Vote {
        #[arg(long, default_value = widget::DEFAULT_API, env = "READY_VOTE_API")]
        api: String,
        #[arg(long, default_value = widget::DEFAULT_FLAG_FILE)]
        flag_file: PathBuf,
    },
    /// Cancel my move: forget the local vote flag (the count is not decremented)
    Cancel {
        #[arg(long, default_value = widget::DEFAULT_API, env = "READY_VOTE_API")]
        api: String,
        #[arg(long, default_value = widget::DEFAULT_FLAG_FILE)]
        flag_file: PathBuf,
    },
    /// Compute a matchmaker result from quiz answers, e.g. `match A C E`
    Match {
        answers: Vec<char>,
        #[arg(long)]
        base: Option<String>,
    },
    /// Build a shareable result link
    Share {
        #[arg(long)]
        city: String,
        #[arg(long)]
        score: i64,
        #[arg(long, default_value = "http://localhost:8080/")]
        base: String,
    },
    /// Show the result encoded in a shared link
    OpenShare { url: String },
}

async fn build_store(kind: StoreKind) -> Result<Arc<dyn VoteStore>, VoteError> {
    match kind {
        StoreKind::Sheets => {
            let config = SheetsConfig::from_env()?;
            let client = SheetsClient::new(&config)?;
            Ok(Arc::new(SheetVoteStore::new(Arc::new(client))))
        }
        StoreKind::Sqlite => Ok(Arc::new(Database::new(&config::database_url()).await?)),
    }
}

fn print_result(result: &MatchResult) {
    let city = result.city;
    println!("{} ({}% ready)", city, result.score);
    println!("{} {}", city.tagline(), city.description());
    println!("{}", city.roast());
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    match cli.command {
        Command::Serve { host, port, store } => {
            let store = build_store(store).await?;
            let config = ServerConfig { host, port };
            server::run(config, AppState { store }).await?;
        }
        Command::Seed { count } => {
            let db = Database::new(&config::database_url()).await?;
            db.seed(count).await?;
            println!("Vote counter set to {}", db.counter().await?.count);
        }
        Command::Count { api } => {
            let mut widget = VoteWidget::new(HttpVoteApi::new(&api)?, FileFlag::new(widget::DEFAULT_FLAG_FILE));
            println!("{}", widget.load().await);
        }
        Command::Vote { api, flag_file } => {
            let mut widget = VoteWidget::new(HttpVoteApi::new(&api)?, FileFlag::new(flag_file));
            let outcome = widget.count_in().await;
            info!("Vote widget is now {:?}", widget.state());
            match outcome {
                VoteOutcome::Recorded(count) => println!("You're in! {} people are ready to move.", count),
                VoteOutcome::AlreadyVoted => {
                    widget.load().await;
                    println!("Already counted. {} people are ready to move.", widget.count());
                }
                VoteOutcome::Failed(alert) => return Err(alert.into()),
            }
        }
        Command::Cancel { api, flag_file } => {
            let mut widget = VoteWidget::new(HttpVoteApi::new(&api)?, FileFlag::new(flag_file));
            widget.cancel()?;
            info!("Vote widget is now {:?}", widget.state());
            println!("Move cancelled. {} people are ready to move.", widget.load().await);
        }
        Command::Match { answers, base } => {
            let answers: Vec<char> = answers.into_iter().map(|c| c.to_ascii_uppercase()).collect();
            let result = MatchResult::from_answers(&answers);
            print_result(&result);
            if let Some(base) = base {
                println!("{}", result.share_url(&base)?);
            }
        }
        Command::Share { city, score, base } => {
            let city = share::City::from_name(&city)
                .ok_or_else(|| format!("Unknown city {}; expected Shanghai, Chengdu or Guangzhou", city))?;
            println!("{}", MatchResult { city, score }.share_url(&base)?);
        }
        Command::OpenShare { url } => {
            let url = Url::parse(&url)?;
            match MatchResult::from_share_url(&url) {
                Some(result) => print_result(&result),
                None => println!("No shared result in this link."),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    info!("Running {:?}", cli.command);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
