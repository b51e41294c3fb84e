//! llmux CLI: entry point.
//!
//! # Commands
//!
//! - `llmux ask PROMPT [-p PROVIDER] [-m MODEL]`: one request, content on stdout
//! - `llmux compare PROMPT -t openai -t claude:MODEL`: same prompt, several targets
//! - `llmux status`: configuration, providers, and stores

mod helpers;
mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use llmux_core::config::{load_config, Config};
use llmux_engine::{compare, Orchestrator, RequestBuilder, UsageStats};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// llmux: one request shape for OpenAI, Claude, Gemini, and Grok
#[derive(Parser)]
#[command(name = "llmux", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.llmux/config.json)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, default_value_t = false)]
    logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one prompt and print the answer
    Ask {
        prompt: String,

        /// Provider name (openai, claude, gemini, grok)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model id; the provider is inferred from it when not given
        #[arg(short, long)]
        model: Option<String>,

        #[command(flatten)]
        request: RequestArgs,

        /// Print the full response as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Send one prompt to several providers concurrently
    Compare {
        prompt: String,

        /// Target as `provider` or `provider:model`; repeat for each target
        #[arg(short, long = "target", required = true)]
        targets: Vec<String>,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Show configuration and provider status
    Status,
}

/// Request settings shared by `ask` and `compare`.
#[derive(Args)]
struct RequestArgs {
    /// System prompt
    #[arg(short, long)]
    system: Option<String>,

    /// Named preset to start from
    #[arg(long)]
    preset: Option<String>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(long)]
    temperature: Option<f64>,

    #[arg(long)]
    max_tokens: Option<u32>,

    /// Template variable `name=value`; repeat for each variable
    #[arg(long = "var", value_parser = helpers::parse_var)]
    vars: Vec<(String, String)>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Skip the response cache
    #[arg(long, default_value_t = false)]
    no_cache: bool,
}

impl RequestArgs {
    fn apply(self, mut builder: RequestBuilder) -> RequestBuilder {
        if let Some(system) = self.system {
            builder = builder.system_prompt(system);
        }
        if let Some(preset) = self.preset {
            builder = builder.preset(preset);
        }
        if let Some(temperature) = self.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if let Some(secs) = self.timeout {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if self.no_cache {
            builder = builder.no_cache();
        }
        for (name, value) in self.vars {
            builder = builder.var(name, value);
        }
        builder
    }
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.logs);

    let config_path = cli.config.as_deref().map(helpers::expand_tilde);
    let config = load_config(config_path.as_deref());

    match cli.command {
        Commands::Ask {
            prompt,
            provider,
            model,
            request,
            json,
        } => run_ask(&config, prompt, provider, model, request, json).await,
        Commands::Compare {
            prompt,
            targets,
            request,
        } => run_compare(&config, prompt, targets, request).await,
        Commands::Status => status::run(&config, config_path),
    }
}

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    Orchestrator::from_config(config).context("failed to initialize llmux")
}

// ─────────────────────────────────────────────
// Ask command
// ─────────────────────────────────────────────

async fn run_ask(
    config: &Config,
    prompt: String,
    provider: Option<String>,
    model: Option<String>,
    args: RequestArgs,
    json: bool,
) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;

    let mut builder = args.apply(orchestrator.prompt(prompt));
    if let Some(provider) = provider {
        builder = builder.provider(provider);
    }
    if let Some(model) = model {
        builder = builder.model(model);
    }

    let response = builder.request().await.context("request failed")?;
    info!(
        provider = response.provider.as_deref().unwrap_or(""),
        cached = response.cached,
        "request complete"
    );

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("failed to serialize response")?
        );
    } else {
        helpers::print_response(&response, orchestrator.costs().currency());
    }

    if let Some(ref err) = response.error {
        bail!("unusable response: {err}");
    }
    Ok(())
}

// ─────────────────────────────────────────────
// Compare command
// ─────────────────────────────────────────────

async fn run_compare(
    config: &Config,
    prompt: String,
    targets: Vec<String>,
    args: RequestArgs,
) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    let stats = Arc::new(UsageStats::new());
    let base = args.apply(orchestrator.prompt(prompt)).stats(stats.clone());

    let targets: Vec<&str> = targets.iter().map(String::as_str).collect();
    let responses = compare(&base, &targets).await;

    let currency = orchestrator.costs().currency();
    for (target, response) in targets.iter().zip(&responses) {
        helpers::print_labeled(target, response, currency);
    }
    helpers::print_summary(&stats.snapshot(), currency);

    let failed = responses.iter().filter(|r| r.is_error()).count();
    if failed == responses.len() {
        bail!("all {failed} targets failed");
    }
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("llmux=debug,llmux_core=debug,llmux_providers=debug,llmux_engine=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
