//! Talk to a manuscript-writing agent backend from the command line.
//!
//! # Examples
//!
//! ```sh
//! # Stream a prompt; progress goes to stderr, the answer to stdout
//! manugen "Draft an introduction about CRISPR screening"
//!
//! # Pipe content from stdin, prefixed by an instruction
//! cat notes.md | manugen "Turn these notes into a methods section" --stdin
//!
//! # Non-streaming run, full event list as JSON
//! manugen "Summarize the results" --batch --raw
//!
//! # Describe a figure
//! manugen --image figures/growth.png
//!
//! # Look up citations
//! manugen --cite doi:10.1371/journal.pcbi.1007128 --cite pmid:29424689 \
//!   --cite-url http://localhost:8000/manubot/cite
//! ```

use clap::Parser;
use manugen_client::config::{DEFAULT_API_URL, DEFAULT_APP_NAME, DEFAULT_USER_ID};
use manugen_client::prelude::*;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Send a prompt to an ADK agent backend and print the answer.
#[derive(Parser)]
#[command(name = "manugen", version)]
struct Cli {
    // ── Input ──────────────────────────────────────────────────
    /// Prompt to send
    prompt: Option<String>,

    /// Read prompt content from stdin (appended after PROMPT if both are given)
    #[arg(long)]
    stdin: bool,

    /// Submit an image and print the agent's description of it
    #[arg(
        long,
        value_name = "PATH",
        conflicts_with_all = ["cite", "prompt", "stdin", "batch", "raw", "partial"]
    )]
    image: Option<PathBuf>,

    /// Look up a citation id (repeatable)
    #[arg(long = "cite", value_name = "ID")]
    cite: Vec<String>,

    // ── Backend ────────────────────────────────────────────────
    /// Base URL of the agent API
    #[arg(long, env = "MANUGEN_API", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Agent application name
    #[arg(long, env = "MANUGEN_APP", default_value = DEFAULT_APP_NAME)]
    app: String,

    /// User id sessions are created under
    #[arg(long, default_value = DEFAULT_USER_ID)]
    user: String,

    /// Citation lookup endpoint (required with --cite)
    #[arg(long, env = "MANUGEN_CITE_URL")]
    cite_url: Option<String>,

    // ── Run control ────────────────────────────────────────────
    /// Use the non-streaming run endpoint
    #[arg(long)]
    batch: bool,

    /// Stream token-level partial events as they are generated
    #[arg(long, conflicts_with = "batch")]
    partial: bool,

    /// Cancel the operation after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    // ── Output ─────────────────────────────────────────────────
    /// Print the full event list as JSON instead of the reduced answer
    #[arg(long)]
    raw: bool,

    /// Log requests and events to stderr (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

enum CliError {
    Usage(String),
    Client(ClientError),
}

impl From<ClientError> for CliError {
    fn from(e: ClientError) -> Self {
        CliError::Client(e)
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_prompt(cli: &Cli) -> Result<String, CliError> {
    let piped = if cli.stdin {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(ClientError::from)?;
        Some(buf)
    } else {
        None
    };

    match (&cli.prompt, piped) {
        (Some(prompt), Some(piped)) => Ok(format!("{prompt}\n\n{piped}")),
        (Some(prompt), None) => Ok(prompt.clone()),
        (None, Some(piped)) => Ok(piped),
        (None, None) => Err(CliError::Usage(
            "provide a PROMPT, --stdin, --image, or --cite".to_string(),
        )),
    }
}

/// Cancel `token` on Ctrl-C or once `timeout` elapses.
fn spawn_cancellation(token: &CancellationToken, timeout: Option<Duration>) {
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("  [cancelled]");
            on_signal.cancel();
        }
    });
    if let Some(timeout) = timeout {
        let on_deadline = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            debug!("Deadline of {timeout:?} reached");
            on_deadline.cancel();
        });
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value).map_err(ClientError::from)?)
}

async fn run(cli: &Cli) -> Result<String, CliError> {
    let mut config = ClientConfig::new(&cli.api_url, &cli.app)?.with_user_id(&cli.user)
        .with_token_streaming(cli.partial);
    if let Some(url) = &cli.cite_url {
        config = config.with_citation_url(url)?;
    }
    let client = AdkClient::new(config.clone())?;

    let cancel = CancellationToken::new();
    spawn_cancellation(&cancel, cli.timeout.map(Duration::from_secs));

    // ── Citation lookup (no session needed) ────────────────────
    if !cli.cite.is_empty() {
        let source = client
            .citation_source()
            .ok_or_else(|| CliError::Usage("--cite requires --cite-url".to_string()))?;
        let cache = CitationCache::new(source);
        let citations = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled.into()),
            result = cache.get_or_fetch(&cli.cite) => result?,
        };
        return to_json(&citations);
    }

    // Fail on bad input before touching the backend.
    let upload = cli.image.as_deref().map(InlineData::from_path).transpose()?;
    let prompt = if upload.is_none() {
        Some(build_prompt(cli)?)
    } else {
        None
    };

    let identity = SessionIdentity::new(&config.app_name, &config.user_id, &SystemClock);
    debug!("Session identity {identity}");
    let bootstrapper = SessionBootstrapper::new(client.clone(), identity, config.session_retry);
    let session = bootstrapper.session(&cancel).await?;

    // ── Artifact submission ────────────────────────────────────
    if let Some(data) = upload {
        let description = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled.into()),
            result = client.submit_artifact(session, data) => result?,
        };
        return to_json(&description);
    }

    let prompt = prompt.unwrap_or_default();

    // ── Batch run ──────────────────────────────────────────────
    let events = if cli.batch {
        tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled.into()),
            result = client.run(session, NewMessage::user_text(&prompt)) => result?,
        }
    } else {
        // ── Streaming run ──────────────────────────────────────
        let observer = CompositeObserver::new()
            .with(LoggingObserver)
            .with_if(
                !cli.raw,
                ProgressObserver::new(|notice: &str| eprintln!("  [{notice}]")),
            );
        client
            .run_sse(session, NewMessage::user_text(&prompt), &observer, &cancel)
            .await?
    };

    if cli.raw {
        return to_json(&events);
    }
    Ok(extract_text(&events))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(output) => println!("{output}"),
        Err(CliError::Usage(msg)) => {
            eprintln!("Error: {msg}");
            process::exit(2);
        }
        Err(CliError::Client(e)) => {
            eprintln!("Error: {}: {e}", e.user_message());
            process::exit(1);
        }
    }
}
