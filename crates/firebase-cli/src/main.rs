//! # firebase
//!
//! Command-line access to a Firebase Realtime Database location: one
//! subcommand per REST operation, plus `watch` for streaming changes.

use anyhow::Context;
use clap::{Parser, Subcommand};
use firebase_http::{ClientConfig, Firebase, WatchOptions};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "firebase")]
#[command(about = "Read, write and watch a Firebase Realtime Database")]
struct Cli {
    /// Database location, e.g. `my-app.firebaseio.com/users`
    url: String,

    /// Auth token or database secret
    #[arg(long, env = "FIREBASE_AUTH")]
    auth: Option<String>,

    /// Only fetch the keys of object children
    #[arg(long)]
    shallow: bool,

    /// Budget for connecting plus waiting for response headers
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value at the location
    Get,
    /// Replace the value at the location
    Set { value: String },
    /// Merge children into the location
    Update { value: String },
    /// Append a value under a generated key
    Push { value: String },
    /// Delete the location
    Remove,
    /// Print changes until interrupted
    Watch {
        /// Print the full value after every change
        #[arg(long)]
        mirror: bool,
    },
}

fn parse_value(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("not valid JSON: {}", raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "firebase_http=info,warn".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(ms) = cli.timeout_ms {
        config.timeout = Duration::from_millis(ms);
    }
    let buffer = config.watch_buffer;

    let mut fb = Firebase::with_config(&cli.url, config)?;
    if let Some(token) = cli.auth {
        fb.auth(token);
    }
    fb.shallow(cli.shallow);

    match cli.command {
        Commands::Get => {
            let value: Value = fb.value().await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Set { value } => {
            fb.set(&parse_value(&value)?).await?;
            info!("Wrote {}", fb);
        }
        Commands::Update { value } => {
            fb.update(&parse_value(&value)?).await?;
            info!("Updated {}", fb);
        }
        Commands::Push { value } => {
            let pushed = fb.push(&parse_value(&value)?).await?;
            println!("{}", pushed);
        }
        Commands::Remove => {
            fb.remove().await?;
            info!("Removed {}", fb);
        }
        Commands::Watch { mirror } => {
            let (tx, rx) = async_channel::bounded(buffer);
            fb.watch_with(tx, WatchOptions { mirror }).await?;
            info!("Watching {} (Ctrl-C to stop)", fb);

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        fb.stop_watching().await;
                        break;
                    }
                    item = rx.recv() => match item {
                        Ok(Ok(event)) => println!("{}", serde_json::to_string(&event)?),
                        Ok(Err(e)) => {
                            warn!("Watch ended: {}", e);
                            return Err(e.into());
                        }
                        Err(_) => {
                            info!("Stream closed by server");
                            break;
                        }
                    },
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::parse_from(["firebase", "example.firebaseio.com", "--shallow", "get"]);
        assert!(cli.shallow);
        assert!(matches!(cli.command, Commands::Get));

        let cli = Cli::parse_from(["firebase", "x.firebaseio.com", "watch", "--mirror"]);
        assert!(matches!(cli.command, Commands::Watch { mirror: true }));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("{\"a\":1}").unwrap()["a"], 1);
        assert!(parse_value("{oops").is_err());
    }
}
