//! mimir: command-line front end for the gateway
//!
//! Sends prompts through the configured cache and targets, and inspects
//! cache keys and configuration.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use mimir::{CacheKey, Gateway, InvocationRequest, MimirConfig, normalize};

/// Mimir CLI
#[derive(Parser)]
#[command(name = "mimir")]
#[command(version)]
#[command(about = "Cached, resilient foundation-model invocation")]
struct Args {
    /// Config file (default: ~/.mimir/config.toml, then /etc/mimir/config.toml)
    #[arg(short, long, env = "MIMIR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a prompt through the gateway
    Ask {
        /// Prompt text (or omit to read from stdin)
        prompt: Option<String>,
        /// System prompt
        #[arg(short, long)]
        system: Option<String>,
        /// Maximum output tokens
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f32>,
        /// Send the same prompt this many times (shows cache behaviour)
        #[arg(long, default_value_t = 1)]
        repeat: u32,
        /// Cache TTL for this request, in seconds
        #[arg(long)]
        ttl_secs: Option<u64>,
    },

    /// Print the normalized form and cache key of a text
    Fingerprint {
        /// Text to fingerprint (or omit to read from stdin)
        text: Option<String>,
        /// Optional scope mixed into the key (e.g. a target id)
        #[arg(long)]
        scope: Option<String>,
    },

    /// Load and validate the configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Fingerprint { text, scope } => {
            let text = resolve_text(text, "fingerprint")?;
            println!("normalized: {}", normalize(&text));
            println!("key: {}", CacheKey::derive(&text, scope.as_deref()));
        }

        Command::CheckConfig => {
            let config = MimirConfig::load(args.config.as_deref())?;
            println!("primary: {}", config.primary_target);
            println!(
                "fallback: {}",
                config.fallback_target.as_deref().unwrap_or("none")
            );
            for (id, target) in &config.targets {
                let key = match (&target.api_key_env, target.api_key()) {
                    (None, _) => "no key",
                    (Some(_), Some(_)) => "key set",
                    (Some(_), None) => "key MISSING",
                };
                println!(
                    "target {id}: {} {} @ {} ({key})",
                    target.kind, target.model, target.endpoint
                );
            }
            let retry = config.retry_config();
            println!(
                "retry: {} retries, base {:?}, max {:?}, timeout {:?}",
                retry.max_retries, retry.base_delay, retry.max_delay, retry.attempt_timeout
            );
            let circuit = config.circuit_config();
            println!(
                "circuit: threshold {}, cooldown {:?}",
                circuit.failure_threshold, circuit.cooldown
            );
            if config.cache.enabled {
                println!(
                    "cache: ttl {}s, {} entries, coalesce {}",
                    config.cache.ttl_secs, config.cache.max_entries, config.cache.coalesce
                );
            } else {
                println!("cache: disabled");
            }
            println!("ok");
        }

        Command::Ask {
            prompt,
            system,
            max_tokens,
            temperature,
            repeat,
            ttl_secs,
        } => {
            let config = MimirConfig::load(args.config.as_deref())?;
            let gateway = Gateway::from_config(&config)?;

            let mut request = InvocationRequest::new(resolve_text(prompt, "ask")?);
            if let Some(system) = system {
                request = request.system(system);
            }
            if let Some(max) = max_tokens {
                request = request.max_tokens(max);
            }
            if let Some(temp) = temperature {
                request = request.temperature(temp);
            }

            for round in 1..=repeat.max(1) {
                let outcome = match ttl_secs {
                    Some(secs) => {
                        gateway
                            .generate_with_ttl(&request, Duration::from_secs(secs))
                            .await?
                    }
                    None => gateway.generate(&request).await?,
                };
                if repeat > 1 {
                    println!("--- round {round}");
                }
                println!("{}", outcome.response.text);
                println!(
                    "[target: {}, cached: {}]",
                    outcome.response.target, outcome.cache_hit
                );
            }

            for snapshot in gateway.invoker().circuit_snapshots() {
                println!(
                    "circuit {}: {} (failures: {})",
                    snapshot.target, snapshot.status, snapshot.failure_count
                );
            }
        }
    }

    Ok(())
}

/// Use the argument if given, otherwise read stdin (unless it is a terminal).
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(text) = arg {
        return Ok(text);
    }
    if io::stdin().is_terminal() {
        return Err(format!("{command}: no input given (pass text or pipe via stdin)").into());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf.trim_end().to_string())
}
