use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracker_client::config::DEFAULT_API_BASE_URL;
use tracker_client::net::realtime::{ConnectionStatus, RealtimeEvent};
use tracker_client::net::types::{IssueCreate, IssueStatus, IssueUpdate, Page, Role, Severity, UserCreate, UserUpdate};
use tracker_client::state::{LOGIN_PATH, Navigator};
use tracker_client::token::FileTokenStorage;
use tracker_client::{ClientConfig, ClientError, TrackerClient};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("not logged in; run `tracker login` first")]
    NotLoggedIn,
    #[error("nothing to update; pass at least one field")]
    EmptyUpdate,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("signal handler failed: {0}")]
    Signal(std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "tracker", about = "Issue tracker API and realtime CLI")]
struct Cli {
    #[arg(long, env = "TRACKER_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    base_url: String,

    #[arg(long, env = "TRACKER_TOKEN_FILE", default_value = ".tracker_token")]
    token_file: PathBuf,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the backend is reachable.
    Ping,
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TRACKER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Print the current session.
    Whoami,
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TRACKER_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        role: Option<Role>,
    },
    Issue(IssueCommand),
    User(UserCommand),
    /// Issue counts per status.
    Dashboard,
    /// Stay attached to the realtime channel and print events.
    Watch {
        /// Re-fetch the affected issue (or the issue list) after each event.
        #[arg(long, default_value_t = false)]
        refetch: bool,
    },
}

#[derive(Args, Debug)]
struct IssueCommand {
    #[command(subcommand)]
    command: IssueSubcommand,
}

#[derive(Subcommand, Debug)]
enum IssueSubcommand {
    List {
        #[arg(long)]
        skip: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    Get {
        issue_id: i64,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        severity: Option<Severity>,
    },
    Update {
        issue_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        severity: Option<Severity>,
        #[arg(long)]
        status: Option<IssueStatus>,
    },
    Delete {
        issue_id: i64,
    },
}

#[derive(Args, Debug)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand, Debug)]
enum UserSubcommand {
    List,
    Get {
        user_id: i64,
    },
    Update {
        user_id: i64,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        is_active: Option<bool>,
        #[arg(long)]
        role: Option<Role>,
    },
    Delete {
        user_id: i64,
    },
}

/// Terminal stand-in for a router: tells the user where to go next.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, path: &str) {
        if path == LOGIN_PATH {
            eprintln!("signed out; run `tracker login` to sign in again");
        } else {
            eprintln!("next: {path}");
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; flags and the real environment still apply.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ClientConfig::new(&cli.base_url)?;
    let client = TrackerClient::new(
        config,
        FileTokenStorage::new(cli.token_file),
        Some(Arc::new(TerminalNavigator)),
    )?;

    let result = dispatch(&client, cli.command).await;
    client.shutdown().await;
    result
}

/// Run one command. `run` closes the realtime channel afterwards on every path.
async fn dispatch(client: &TrackerClient, command: Command) -> Result<(), CliError> {
    match command {
        Command::Ping => print_json(&client.api().hello().await?),
        Command::Login { email, password } => {
            let state = client.auth().login(&email, &password).await?;
            print_json(&state.session)
        }
        Command::Logout => {
            client.auth().logout();
            Ok(())
        }
        Command::Whoami => {
            let state = client.auth().initialize().await;
            if !state.session.is_authenticated {
                return Err(CliError::NotLoggedIn);
            }
            print_json(&state.session)
        }
        Command::Register { email, password, role } => {
            let user = client.api().register(&UserCreate { email, password, role }).await?;
            print_json(&user)
        }
        Command::Issue(issue) => run_issue(client, issue).await,
        Command::User(user) => run_user(client, user).await,
        Command::Dashboard => print_json(&client.api().dashboard_status_counts().await?),
        Command::Watch { refetch } => run_watch(client, refetch).await,
    }
}

async fn run_issue(client: &TrackerClient, issue: IssueCommand) -> Result<(), CliError> {
    let api = client.api();
    match issue.command {
        IssueSubcommand::List { skip, limit } => {
            let page = page_from(skip, limit);
            print_json(&api.list_issues(page).await?)
        }
        IssueSubcommand::Get { issue_id } => print_json(&api.get_issue(issue_id).await?),
        IssueSubcommand::Create { title, description, severity } => {
            let created = api.create_issue(&IssueCreate { title, description, severity }).await?;
            print_json(&created)
        }
        IssueSubcommand::Update { issue_id, title, description, severity, status } => {
            let update = IssueUpdate { title, description, severity, status };
            if update.is_empty() {
                return Err(CliError::EmptyUpdate);
            }
            print_json(&api.update_issue(issue_id, &update).await?)
        }
        IssueSubcommand::Delete { issue_id } => {
            api.delete_issue(issue_id).await?;
            eprintln!("deleted issue {issue_id}");
            Ok(())
        }
    }
}

async fn run_user(client: &TrackerClient, user: UserCommand) -> Result<(), CliError> {
    let api = client.api();
    match user.command {
        UserSubcommand::List => print_json(&api.list_users().await?),
        UserSubcommand::Get { user_id } => print_json(&api.get_user(user_id).await?),
        UserSubcommand::Update { user_id, email, password, is_active, role } => {
            let update = UserUpdate { email, password, is_active, role };
            if update.is_empty() {
                return Err(CliError::EmptyUpdate);
            }
            print_json(&api.update_user(user_id, &update).await?)
        }
        UserSubcommand::Delete { user_id } => {
            api.delete_user(user_id).await?;
            eprintln!("deleted user {user_id}");
            Ok(())
        }
    }
}

async fn run_watch(client: &TrackerClient, refetch: bool) -> Result<(), CliError> {
    let realtime = client.realtime();
    let mut events = realtime.subscribe();
    let mut status = realtime.status();
    realtime.connect().await?;
    eprintln!("watching {} (ctrl-c to stop)", realtime.url());

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(CliError::Signal)?;
                return Ok(());
            }
            changed = status.changed() => {
                if changed.is_err() || *status.borrow_and_update() == ConnectionStatus::Disconnected {
                    eprintln!("realtime channel closed");
                    return Ok(());
                }
            }
            event = events.next() => {
                let Some(event) = event else {
                    return Ok(());
                };
                print_json(event.data())?;
                if refetch {
                    refetch_for(client, &event).await?;
                }
            }
        }
    }
}

/// Re-query what an event points at. A vanished issue is reported, not fatal.
async fn refetch_for(client: &TrackerClient, event: &RealtimeEvent) -> Result<(), CliError> {
    let Some(issue_id) = event.issue_id() else {
        return print_json(&client.api().list_issues(None).await?);
    };
    match client.api().get_issue(issue_id).await {
        Ok(issue) => print_json(&issue),
        Err(ClientError::Api { status: 404, .. }) => {
            eprintln!("issue {issue_id} no longer exists");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

fn page_from(skip: Option<u32>, limit: Option<u32>) -> Option<Page> {
    if skip.is_none() && limit.is_none() {
        return None;
    }
    let default = Page::default();
    Some(Page { skip: skip.unwrap_or(default.skip), limit: limit.unwrap_or(default.limit) })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod main_test;
