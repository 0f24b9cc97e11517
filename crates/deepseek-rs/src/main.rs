//! Send one chat message to DeepSeek and print the reply.
//!
//! Reads the API key from `--api-key`, the `DEEPSEEK_API_KEY` environment
//! variable, or the `api_key` field of a settings file, in that order.
//! Press Ctrl-C while waiting to cancel the request.
//!
//! # Examples
//!
//! ```sh
//! # Basic request
//! deepseek --user "Explain lifetimes in two sentences"
//!
//! # Pipe content from stdin, with an instruction in front
//! cat src/lib.rs | deepseek --user "Review this file:" --stdin
//!
//! # Custom settings file and model
//! deepseek --config ~/.config/deepseek.json --model deepseek-reasoner --user "Hi"
//!
//! # Debug logging of attempts and retries
//! RUST_LOG=deepseek_rs=debug deepseek --user "Hi"
//! ```

use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use deepseek_rs::{ClientConfig, CompletionClient, Outcome, api_key_from_env, has_api_key};
use tokio::sync::oneshot;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Send one chat message to DeepSeek and print the reply.
///
/// Reads the API key from the DEEPSEEK_API_KEY environment variable unless
/// --api-key or a settings file provides one.
#[derive(Parser)]
#[command(name = "deepseek")]
struct Cli {
    /// User message to send
    #[arg(long)]
    user: Option<String>,

    /// Read user content from stdin
    #[arg(long)]
    stdin: bool,

    /// Model to use instead of the configured one
    #[arg(long)]
    model: Option<String>,

    /// JSON settings file (endpoint, model, api_key, timeouts, attempts)
    #[arg(long)]
    config: Option<PathBuf>,

    /// API key (overrides DEEPSEEK_API_KEY and the settings file)
    #[arg(long)]
    api_key: Option<String>,
}

// ── Helpers ────────────────────────────────────────────────────────

fn read_stdin_content() -> Result<String, String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(buf)
}

fn build_user_content(cli: &Cli) -> Result<String, String> {
    let stdin_text = if cli.stdin {
        Some(read_stdin_content()?)
    } else {
        None
    };

    let content = match (&cli.user, stdin_text) {
        (Some(msg), Some(piped)) => format!("{msg}\n\n{piped}"),
        (Some(msg), None) => msg.clone(),
        (None, Some(piped)) => piped,
        (None, None) => return Err("provide --user, --stdin, or both".to_string()),
    };
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err("message is empty".to_string());
    }
    Ok(trimmed.to_string())
}

/// Resolve settings and the API key from flags, environment and file.
fn resolve_settings(cli: &Cli) -> Result<(ClientConfig, String), String> {
    let (mut config, file_key) = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => (ClientConfig::default(), None),
    };
    if let Some(model) = &cli.model {
        config = config.with_model(model);
    }

    let api_key = cli
        .api_key
        .clone()
        .filter(|k| has_api_key(Some(k.as_str())))
        .or_else(api_key_from_env)
        .or(file_key)
        .filter(|k| has_api_key(Some(k.as_str())))
        .ok_or_else(|| {
            "API key not configured. Set DEEPSEEK_API_KEY, pass --api-key, \
             or add \"api_key\" to the settings file."
                .to_string()
        })?;

    Ok((config, api_key.trim().to_string()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn send_message(cli: &Cli) -> Result<Outcome, String> {
    let (config, api_key) = resolve_settings(cli)?;
    let message = build_user_content(cli)?;

    eprintln!("  [{}] waiting for reply (Ctrl-C to cancel)", config.model);
    let client = Arc::new(CompletionClient::with_config(api_key, config));

    // `send` blocks, so it gets its own thread outside the runtime; this task
    // stays free to react to Ctrl-C.
    let (tx, mut rx) = oneshot::channel();
    let worker = {
        let client = client.clone();
        std::thread::Builder::new()
            .name("deepseek-send".to_string())
            .spawn(move || {
                let _ = tx.send(client.send(&message));
            })
            .map_err(|e| format!("failed to spawn request thread: {e}"))?
    };

    let finished = tokio::select! {
        result = &mut rx => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    let outcome = match finished {
        Some(result) => result,
        None => {
            debug!("Ctrl-C received, cancelling");
            client.cancel();
            rx.await
        }
    }
    .map_err(|_| "request thread exited without a result".to_string())?;

    if worker.join().is_err() {
        debug!("request thread panicked after reporting");
    }
    Ok(outcome)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    match send_message(&cli).await {
        Ok(Outcome::Success { text }) => println!("{text}"),
        Ok(failure) => {
            eprintln!("{failure}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
