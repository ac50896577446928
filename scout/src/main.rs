use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use scout::{ActionOutcome, Notice, ScoutConfig, Workbench, WorkbenchError};
use scout_auth::{
    OidcGrant, OidcTokenSource, Session, SessionTokenSource, StaticTokenSource,
};
use scout_client::{Accounts, PasswordTokenSource, Registration, ScoutClient};
use scout_history::HistoryStore;
use scout_types::{History, HistoryPage, Provider};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

#[derive(Parser, Debug)]
#[command(name = "scout", version, about = "Streaming AI search and document analysis")]
struct Cli {
    /// Config file (default: ./scout.json when present).
    #[arg(long, global = true, env = "SCOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Search service base URL.
    #[arg(long, global = true, env = "SCOUT_BASE_URL")]
    base_url: Option<String>,

    /// Bearer token to use as is.
    #[arg(long, global = true, env = "SCOUT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Account email.
    #[arg(long, global = true, env = "SCOUT_EMAIL")]
    email: Option<String>,

    /// Account password.
    #[arg(long, global = true, env = "SCOUT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Identity-provider refresh token (requires an `oidc` config block).
    #[arg(long, global = true, env = "SCOUT_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,

    /// Debug logging for scout crates.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the models each provider offers.
    Models,
    /// Stream an answer to a query.
    Search {
        query: String,
        #[arg(long)]
        provider: Option<Provider>,
        #[arg(long)]
        model: Option<String>,
        /// Restrict retrieval to an uploaded document.
        #[arg(long)]
        document_id: Option<String>,
    },
    /// Upload a document (.pdf, .docx, .txt) and print its analysis.
    Analyze {
        file: PathBuf,
        #[arg(long)]
        provider: Option<Provider>,
        #[arg(long)]
        model: Option<String>,
    },
    /// Show past searches and analyses.
    History {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Delete an uploaded document.
    DeleteDocument { id: String },
    /// Exchange --email/--password for an access token and print it.
    Login,
    /// Create an account from --email/--password.
    Register {
        #[arg(long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("scout: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if verbose {
        for target in ["scout", "scout_client", "scout_auth", "scout_history"] {
            if let Ok(directive) = format!("{target}=debug").parse::<Directive>() {
                filter = filter.add_directive(directive);
            }
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode, WorkbenchError> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut config = ScoutConfig::load(cli.config.as_deref(), &cwd)?;
    if let Some(url) = &cli.base_url {
        config.base_url = url.clone();
    }

    let accounts = Accounts::new()
        .base_url(config.base_url.clone())
        .timeout(config.request_timeout());

    match &cli.command {
        Command::Login => {
            let (email, password) = credentials(&cli)?;
            let token = accounts.login(email, password).await?;
            token.with_secret(|t| println!("{t}"));
            return Ok(ExitCode::SUCCESS);
        }
        Command::Register { username } => {
            let (email, password) = credentials(&cli)?;
            let ack = accounts
                .register(&Registration::new(email, username.as_str(), password))
                .await?;
            if ack.is_empty() {
                eprintln!("registered {email}");
            } else {
                eprintln!("{ack}");
            }
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let source = token_source(&cli, &config, accounts)?;
    let session = Arc::new(Session::start(source, config.refresh_policy()).await?);
    let client = ScoutClient::new(Arc::clone(&session))
        .base_url(config.base_url.clone())
        .timeout(config.request_timeout());
    let (workbench, notices) = Workbench::new(
        Arc::new(client),
        Arc::new(HistoryStore::new()),
        config.default_provider,
    );
    let printer = tokio::spawn(print_notices(notices));

    let code = dispatch(cli.command, workbench).await;

    // The workbench is gone, so the notice channel is closed.
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "notice printer ended abnormally");
    }
    if let Err(e) = session.logout().await {
        tracing::warn!(error = %e, "logout failed");
    }
    Ok(code)
}

fn credentials(cli: &Cli) -> Result<(&str, &str), WorkbenchError> {
    match (cli.email.as_deref(), cli.password.as_deref()) {
        (Some(email), Some(password)) => Ok((email, password)),
        _ => Err(WorkbenchError::MissingCredentials),
    }
}

fn token_source(
    cli: &Cli,
    config: &ScoutConfig,
    accounts: Accounts,
) -> Result<Arc<dyn SessionTokenSource>, WorkbenchError> {
    if let Some(token) = &cli.token {
        return Ok(Arc::new(StaticTokenSource::new(token.as_str())));
    }

    if let Some(oidc) = &config.oidc {
        let grant = match (&cli.refresh_token, cli.email.as_deref(), cli.password.as_deref()) {
            (Some(refresh), _, _) => Some(OidcGrant::refresh_token(refresh.as_str())),
            (None, Some(email), Some(password)) => Some(OidcGrant::password(email, password)),
            _ => None,
        };
        if let Some(grant) = grant {
            let mut source = OidcTokenSource::new(&oidc.token_url, &oidc.client_id, grant);
            if let Some(secret) = &oidc.client_secret {
                source = source.client_secret(secret.as_str());
            }
            return Ok(Arc::new(source));
        }
    }

    let (email, password) = credentials(cli)?;
    Ok(Arc::new(PasswordTokenSource::new(accounts, email, password)))
}

async fn dispatch(command: Command, workbench: Workbench) -> ExitCode {
    let outcome = match command {
        Command::Models => {
            let outcome = workbench.load_catalog().await;
            if outcome == ActionOutcome::Completed {
                print_catalog(&workbench);
            }
            outcome
        }
        Command::Search {
            query,
            provider,
            model,
            document_id,
        } => {
            if workbench.load_catalog().await != ActionOutcome::Completed {
                return exit_code(ActionOutcome::Failed);
            }
            if !select(&workbench, provider, model.as_deref()) {
                return exit_code(ActionOutcome::Rejected);
            }
            search(workbench, &query, document_id.as_deref()).await
        }
        Command::Analyze {
            file,
            provider,
            model,
        } => {
            if workbench.load_catalog().await != ActionOutcome::Completed {
                return exit_code(ActionOutcome::Failed);
            }
            if !select(&workbench, provider, model.as_deref()) {
                return exit_code(ActionOutcome::Rejected);
            }
            let outcome = workbench.analyze_path(&file).await;
            if outcome == ActionOutcome::Completed {
                println!("{}", workbench.buffer().snapshot());
            }
            outcome
        }
        Command::History { skip, limit } => {
            let workbench = workbench.with_history_page(HistoryPage { skip, limit });
            let outcome = workbench.refresh_history().await;
            if outcome == ActionOutcome::Completed {
                let history = workbench.history().snapshot().await;
                print_history(&history);
            }
            outcome
        }
        Command::DeleteDocument { id } => workbench.delete_document(&id).await,
        Command::Login | Command::Register { .. } => ActionOutcome::Completed,
    };
    exit_code(outcome)
}

/// Apply command-line selection. A refused model has already been noticed.
fn select(workbench: &Workbench, provider: Option<Provider>, model: Option<&str>) -> bool {
    if let Some(provider) = provider {
        workbench.select_provider(provider);
    }
    model.is_none_or(|model| workbench.select_model(model).is_ok())
}

/// Run a search with Ctrl-C bound to cancel, echoing the buffer as it grows.
async fn search(workbench: Workbench, query: &str, document_id: Option<&str>) -> ActionOutcome {
    let workbench = Arc::new(workbench);
    let stop = CancellationToken::new();
    let echo = tokio::spawn(echo_buffer(workbench.buffer().subscribe(), stop.clone()));

    let interrupt = {
        let workbench = Arc::clone(&workbench);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                workbench.cancel();
            }
        })
    };

    let outcome = workbench.search(query, document_id).await;

    interrupt.abort();
    stop.cancel();
    if let Err(e) = echo.await {
        tracing::warn!(error = %e, "output task ended abnormally");
    }
    // Let the aborted task release its handle so the notice channel closes.
    if let Err(e) = interrupt.await {
        if !e.is_cancelled() {
            tracing::warn!(error = %e, "interrupt task ended abnormally");
        }
    }
    outcome
}

/// Write each newly appended suffix of the buffer to stdout.
///
/// Stops echoing once stdout refuses a write (a closed pipe, say).
async fn echo_buffer(mut rx: watch::Receiver<String>, stop: CancellationToken) {
    let mut printed = 0;
    loop {
        let stopped = tokio::select! {
            () = stop.cancelled() => true,
            changed = rx.changed() => changed.is_err(),
        };
        let text = rx.borrow_and_update().clone();
        if let Err(e) = emit(&mut std::io::stdout().lock(), &text, &mut printed) {
            tracing::debug!(error = %e, "stdout closed, no longer echoing results");
            return;
        }
        if stopped {
            break;
        }
    }
    if printed > 0 {
        println!();
    }
}

fn emit(out: &mut impl Write, text: &str, printed: &mut usize) -> std::io::Result<()> {
    if text.len() < *printed || !text.is_char_boundary(*printed) {
        // The buffer was cleared for a new action.
        *printed = 0;
    }
    out.write_all(text[*printed..].as_bytes())?;
    out.flush()?;
    *printed = text.len();
    Ok(())
}

async fn print_notices(mut notices: mpsc::UnboundedReceiver<Notice>) {
    while let Some(notice) = notices.recv().await {
        eprintln!("{notice}");
    }
}

fn print_catalog(workbench: &Workbench) {
    let catalog = workbench.catalog();
    let selection = workbench.selection();
    for (provider, models) in catalog.entries() {
        let marker = if provider == selection.provider().as_str() { "*" } else { " " };
        println!("{marker} {provider}: {}", models.join(", "));
    }
}

fn print_history(history: &History) {
    if history.is_empty() {
        println!("no history");
        return;
    }
    if !history.searches.is_empty() {
        println!("Searches:");
        for record in &history.searches {
            println!(
                "  {}  [{}]  {}",
                record.created_at.format("%Y-%m-%d %H:%M"),
                record.model_used,
                record.query
            );
        }
    }
    if !history.analyses.is_empty() {
        println!("Analyses:");
        for record in &history.analyses {
            println!(
                "  {}  [{}]  {}",
                record.created_at.format("%Y-%m-%d %H:%M"),
                record.model_used,
                record.filename
            );
        }
    }
}

fn exit_code(outcome: ActionOutcome) -> ExitCode {
    match outcome {
        ActionOutcome::Completed => ExitCode::SUCCESS,
        ActionOutcome::Failed => ExitCode::FAILURE,
        ActionOutcome::Rejected => ExitCode::from(2),
        ActionOutcome::Canceled => ExitCode::from(130),
    }
}
