//! OCI chat CLI
//!
//! Sends one chat completion to OCI Generative AI (or an OpenAI-compatible
//! model deployment) with OCI request signing:
//! 1. Loads `[auth]`, `[endpoint]` and `[chat]` from a TOML config
//! 2. Builds the signer backend and request authenticator
//! 3. Sends the prompt and prints the assistant reply
//!
//! Usage: `oci-chat [--config PATH] [--model MODEL] [--log-format json|pretty] [--raw] [--print-metrics] PROMPT...`
//! With no prompt arguments the prompt is read from stdin.

mod config;
mod metrics;

use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use oci_authenticator::Authenticator;
use oci_openai::OciOpenAI;
use serde_json::{Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Parsed command line
#[derive(Debug, Parser)]
#[command(name = "oci-chat", about = "Send one chat completion with OCI request signing")]
struct Args {
    /// Config file; falls back to `CONFIG_PATH`, then `oci-chat.toml`
    #[arg(long)]
    config: Option<String>,
    /// Model id, overriding `[chat].model`
    #[arg(long)]
    model: Option<String>,
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
    /// Print the full JSON response instead of the reply text
    #[arg(long)]
    raw: bool,
    /// Render auth metrics to stderr after the reply
    #[arg(long)]
    print_metrics: bool,
    /// Prompt words; read from stdin when empty
    prompt: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if format == LogFormat::Pretty {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    }
}

/// Request body for a single-turn chat completion.
fn chat_request(model: &str, system_prompt: Option<&str>, max_tokens: Option<u32>, prompt: &str) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = system_prompt {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": prompt}));

    let mut body = json!({"model": model, "messages": messages});
    if let Some(max_tokens) = max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

/// The first choice's message text, if the response has one.
fn reply_text(response: &Value) -> Option<&str> {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);
    let prometheus = metrics::install_recorder()?;

    let config_path = Config::resolve_path(args.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let prompt = if args.prompt.is_empty() {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .context("failed to read prompt from stdin")?;
        input.trim().to_string()
    } else {
        args.prompt.join(" ")
    };
    anyhow::ensure!(!prompt.is_empty(), "no prompt given");

    let authenticator = Authenticator::from_settings(&config.auth)
        .await
        .context("failed to initialize OCI authentication")?;
    info!(backend = %authenticator.kind(), "authenticator ready");

    let endpoint = &config.endpoint;
    let mut builder = OciOpenAI::builder()
        .auth(authenticator)
        .timeout(Duration::from_secs(endpoint.timeout_secs));
    if let Some(region) = &endpoint.region {
        builder = builder.region(region);
    }
    if let Some(service_endpoint) = &endpoint.service_endpoint {
        builder = builder.service_endpoint(service_endpoint);
    }
    if let Some(base_url) = &endpoint.base_url {
        builder = builder.base_url(base_url);
    }
    if let Some(compartment_id) = &endpoint.compartment_id {
        builder = builder.compartment_id(compartment_id);
    }
    if let Some(store) = &endpoint.conversation_store_id {
        builder = builder.conversation_store_id(store);
    }
    let client = builder.build().context("failed to build client")?;

    let model = args.model.as_deref().unwrap_or(&config.chat.model);
    let request = chat_request(
        model,
        config.chat.system_prompt.as_deref(),
        config.chat.max_tokens,
        &prompt,
    );
    let response = client
        .chat_completions(&request)
        .await
        .context("chat completion failed")?;

    match reply_text(&response) {
        Some(text) if !args.raw => println!("{text}"),
        _ => println!("{}", serde_json::to_string_pretty(&response)?),
    }
    if args.print_metrics {
        eprint!("{}", prometheus.render());
    }
    Ok(())
}
