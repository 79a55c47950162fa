//! Voice buddy entry point
//!
//! Configuration priority: env vars > `--config` file > `config/{env}` >
//! `config/default` > defaults. Command line flags override the result.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_buddy_agent::{
    create_output, BuddyConfig, ConsoleConfirm, ConversationStateMachine, InputRouter, StdinLines, StdinSource,
    TranscriptFileSource, VoiceBuddy,
};
use voice_buddy_config::{load_settings, ConfigError, InputMode, PersistenceBackend, Settings};
use voice_buddy_core::TranscriptSource;
use voice_buddy_llm::{create_backend, InvokerConfig, PromptBuilder, RetryingInvoker};
use voice_buddy_persistence::open_store;

#[derive(Parser, Debug)]
#[command(name = "voice-buddy")]
#[command(about = "Hotword driven conversational buddy backed by a local or remote LLM", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration environment, loads `config/{env}`
    #[arg(long, env = "VOICE_BUDDY_ENV")]
    env: Option<String>,

    /// Force typed input
    #[arg(long)]
    text: bool,

    /// Wait for the hotword before conversing
    #[arg(long)]
    start_inactive: bool,

    /// Keep turns in memory only
    #[arg(long)]
    memory: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if self.text {
            settings.input.mode = InputMode::Text;
        }
        if self.start_inactive {
            settings.agent.start_inactive = true;
        }
        if self.memory {
            settings.persistence.backend = PersistenceBackend::Memory;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match load_settings(cli.env.as_deref(), cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e @ ConfigError::Invalid(_)) => {
            // Tracing not yet initialized
            eprintln!("Refusing to start, configuration is invalid:");
            for problem in e.problems() {
                eprintln!("  - {}", problem);
            }
            std::process::exit(2);
        }
        Err(e) => return Err(e).context("failed to load configuration"),
    };
    cli.apply(&mut settings);
    if let Err(e) = settings.validate() {
        eprintln!("{}", e);
        std::process::exit(2);
    }

    init_tracing(&settings);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = cli.env.as_deref().unwrap_or("default"),
        "Starting voice buddy"
    );

    if let Some(addr) = &settings.observability.metrics_addr {
        init_metrics(addr)?;
    }

    let mut buddy = build(&settings).await?;
    println!("{}", buddy.welcome_message());

    tokio::select! {
        result = buddy.run() => result.context("conversation loop failed")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
    }

    tracing::info!("Voice buddy stopped");
    Ok(())
}

/// Wire store, model, input and output into the turn loop
async fn build(settings: &Settings) -> anyhow::Result<VoiceBuddy> {
    let store = open_store(&settings.persistence).context("failed to open turn store")?;

    let backend = create_backend(&settings.llm).context("failed to create LLM backend")?;
    if !backend.is_available().await {
        tracing::warn!(
            endpoint = %settings.llm.endpoint,
            model = backend.model_name(),
            "LLM endpoint not reachable, turns will fail until it is"
        );
    }

    let invoker_config = InvokerConfig {
        confirm_send: settings.agent.confirm_send,
        ..InvokerConfig::from(&settings.llm)
    };
    let stdin = StdinLines::spawn().context("failed to start reading stdin")?;
    let invoker = RetryingInvoker::new(backend, PromptBuilder::new(&settings.agent), invoker_config)
        .with_gate(Arc::new(ConsoleConfirm::new(stdin.clone())));

    let voice: Option<Box<dyn TranscriptSource>> = match &settings.input.transcript_path {
        Some(path) => Some(Box::new(TranscriptFileSource::open(path).await?)),
        None => None,
    };
    let input = InputRouter::new(settings.input.mode, voice, Box::new(StdinSource::new(stdin)));
    let output = create_output(&settings.output)?;

    Ok(VoiceBuddy::new(
        BuddyConfig::from(settings),
        ConversationStateMachine::new(&settings.agent),
        invoker,
        store,
        Box::new(input),
        output,
    ))
}

fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("voice_buddy={}", level).into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().with_writer(std::io::stderr).boxed()
    };
    subscriber.with(fmt_layer).init();
}

/// Serve Prometheus metrics on `addr`
fn init_metrics(addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid observability.metrics_addr '{}'", addr))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;

    metrics::describe_counter!("voice_buddy_turns_total", "Completed conversation turns");
    metrics::describe_counter!("voice_buddy_chatter_total", "Inputs logged while passive");
    metrics::describe_counter!("voice_buddy_parse_failures_total", "Model replies that could not be parsed");
    metrics::describe_histogram!("voice_buddy_llm_latency_ms", "Model generation latency");

    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}
