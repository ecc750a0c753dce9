#![expect(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::exit,
    reason = "operator CLI reports on stdout/stderr and sets the exit code"
)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use escola_client::storage::AUTH_TOKEN_KEY;
use escola_client::{
    ApiClient, ClientConfig, EscolaClient, FileStorage, GoalDraft, LocalStorage,
    LoginCredentials, MemoryStorage, ProgressUpdate, TracingLoginNavigator,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "escola-ops")]
#[command(about = "Operator commands against an Escola goals API")]
struct Cli {
    /// API base URL; defaults to NEXT_PUBLIC_API_URL or the local service.
    #[arg(long, global = true)]
    api_base: Option<String>,
    /// Bearer token for this invocation only; takes precedence over --session-file.
    #[arg(long, global = true)]
    token: Option<String>,
    /// JSON file holding `auth_token`/`user` between invocations.
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(name = "auth:login")]
    AuthLogin(AuthLoginArgs),
    #[command(name = "goals:list")]
    GoalsList(GoalsListArgs),
    #[command(name = "goals:show")]
    GoalsShow(GoalIdArgs),
    #[command(name = "goals:create")]
    GoalsCreate(GoalsCreateArgs),
    #[command(name = "goals:progress")]
    GoalsProgress(GoalsProgressArgs),
    #[command(name = "goals:delete")]
    GoalsDelete(GoalIdArgs),
}

#[derive(Args)]
struct AuthLoginArgs {
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Args)]
struct GoalsListArgs {
    #[arg(long)]
    student_id: Option<String>,
}

#[derive(Args)]
struct GoalIdArgs {
    id: String,
}

#[derive(Args)]
struct GoalsCreateArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    specific_details: String,
    #[arg(long)]
    start_date: String,
    #[arg(long)]
    target_date: String,
    #[arg(long)]
    student_id: Option<String>,
    #[arg(long)]
    measurable: Option<String>,
    #[arg(long)]
    achievable: Option<String>,
    #[arg(long)]
    relevant: Option<String>,
}

#[derive(Args)]
struct GoalsProgressArgs {
    id: String,
    /// Progress value; parsed as JSON, otherwise sent as a string.
    #[arg(long)]
    value: String,
    #[arg(long)]
    notes: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let http = api_client(&cli)?;
    let client = EscolaClient::new(&http, Arc::new(TracingLoginNavigator));

    match cli.command {
        Commands::AuthLogin(args) => run_auth_login(&client, args).await,
        Commands::GoalsList(args) => {
            let goals = client.goals.list_goals(args.student_id.as_deref()).await?;
            print_json(&goals)
        }
        Commands::GoalsShow(args) => {
            let id = non_empty(&args.id).context("goal id cannot be empty")?;
            let goal = client.goals.get_goal(&id).await?;
            print_json(&goal)
        }
        Commands::GoalsCreate(args) => {
            let goal = client.goals.create_goal(&goal_draft(args)).await?;
            print_json(&goal)
        }
        Commands::GoalsProgress(args) => {
            let id = non_empty(&args.id).context("goal id cannot be empty")?;
            let mut update = ProgressUpdate::new(parse_progress_value(&args.value)?);
            update.notes = args.notes.as_deref().and_then(non_empty);
            let goal = client.goals.update_progress(&id, &update).await?;
            print_json(&goal)
        }
        Commands::GoalsDelete(args) => {
            let id = non_empty(&args.id).context("goal id cannot be empty")?;
            let response = client.goals.delete_goal(&id).await?;
            print_json(&response)
        }
    }
}

async fn run_auth_login(client: &EscolaClient, args: AuthLoginArgs) -> Result<()> {
    let email = non_empty(&args.email).context("email cannot be empty")?;
    let user = client
        .auth
        .login(&LoginCredentials {
            email,
            password: args.password,
        })
        .await?;
    print_json(&user)
}

fn api_client(cli: &Cli) -> Result<ApiClient> {
    let config = match cli.api_base.as_deref() {
        Some(api_base) => ClientConfig::new(api_base),
        None => ClientConfig::from_env(),
    }
    .context("invalid API base URL")?;

    let token = cli.token.as_deref().and_then(non_empty);
    let storage: Arc<dyn LocalStorage> = match (token, cli.session_file.as_ref()) {
        (Some(token), _) => {
            let storage = MemoryStorage::new();
            storage
                .set_item(AUTH_TOKEN_KEY, &token)
                .context("failed to stage --token")?;
            Arc::new(storage)
        }
        (None, Some(path)) => Arc::new(FileStorage::new(path.clone())),
        (None, None) => Arc::new(MemoryStorage::new()),
    };

    ApiClient::new(&config, storage).context("failed to build API client")
}

fn goal_draft(args: GoalsCreateArgs) -> GoalDraft {
    GoalDraft {
        student_id: args.student_id.as_deref().and_then(non_empty),
        title: args.title,
        specific_details: args.specific_details,
        measurable: args.measurable,
        achievable: args.achievable,
        relevant: args.relevant,
        start_date: args.start_date,
        target_date: args.target_date,
    }
}

fn parse_progress_value(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    if trimmed == "null" {
        bail!("--value cannot be null");
    }
    Ok(serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(raw.to_string())))
}

fn non_empty(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn print_json<T>(value: &T) -> Result<()>
where
    T: Serialize,
{
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}
