//! Binary entry point: wires configuration, the service registry, the
//! conversation/entity stores, an LLM adapter, and the Plan State Machine
//! behind the Orchestrator Facade, then drives one turn from the command
//! line. Also starts the background health-probe scheduler that keeps the
//! registry's agent statuses current between runs. The CLI's own UX is out
//! of scope (§1) — this is the thin front end that still needs to exist to
//! exercise the facade end to end.

mod llm;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use a2a_conversation::{ConversationStore, EntityMemoryStore};
use a2a_core::{Orchestrator, OrchestratorEvent, PlanStateMachine, TimeoutWrappedAdapter};
use a2a_protocol::AgentClient;
use a2a_registry::ServiceRegistry;
use a2a_resilience::{init_tracing, CircuitBreakerRegistry, ResilientCaller, RpcTransport};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;
use tracing::warn;

use crate::llm::LlmAdapter;

#[derive(Parser)]
#[command(name = "a2a-orchestratord", about = "Plan-and-execute orchestrator for A2A agents")]
struct Cli {
    /// Path to a TOML config file layered under defaults and `A2A__*` env vars (§6).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Registers a remote agent by fetching its agent-card (§6 discovery endpoint).
    Register {
        /// Base endpoint the agent serves `/a2a` and `/a2a/agent-card` under.
        endpoint: String,
    },
    /// Drives one orchestrator turn for a thread and prints the event stream.
    Run {
        #[arg(long)]
        thread_id: String,
        #[arg(long)]
        message: String,
        /// Human reply resuming a prior interrupt (§4.9, S5).
        #[arg(long)]
        resume: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = a2a_config::AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.service_name);
    std::fs::create_dir_all(&config.data_dir).with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    let registry_path = config.data_dir.join("registry.json");
    let registry = Arc::new(if registry_path.exists() {
        ServiceRegistry::load(&registry_path, build_caller(&config))?
    } else {
        ServiceRegistry::new(build_caller(&config))
    });

    spawn_health_probe_scheduler(registry.clone(), registry_path.clone(), build_caller(&config), config.health_interval());

    match cli.command {
        Command::Register { endpoint } => {
            registry.register_via_discovery(&endpoint).await.context("registering agent")?;
            registry.save(&registry_path).context("persisting registry snapshot")?;
            println!("registered agent at {endpoint}");
        }
        Command::Run { thread_id, message, resume } => {
            let conversation = Arc::new(ConversationStore::new(config.data_dir.join("threads")));
            let entity_memory = Arc::new(EntityMemoryStore::new(config.data_dir.join("entities")));

            let llm_endpoint = std::env::var("A2A_LLM_ENDPOINT").unwrap_or_else(|_| "http://localhost:8090".to_string());
            let adapter = LlmAdapter::new(llm_endpoint);

            let state_machine = Arc::new(PlanStateMachine::new(
                conversation.clone(),
                entity_memory,
                registry,
                build_caller(&config),
                Arc::new(adapter.clone()),
                Arc::new(TimeoutWrappedAdapter::new(adapter.clone(), config.health_timeout())),
                Arc::new(TimeoutWrappedAdapter::new(adapter, config.health_timeout())),
                config.core_config(),
            ));
            let orchestrator = Arc::new(Orchestrator::new(conversation, state_machine));

            let mut events = orchestrator.run(thread_id, message, resume);
            while let Some(event) = events.next().await {
                print_event(&event);
            }
        }
    }

    Ok(())
}

/// Builds a fresh `ResilientCaller` from config. Called once per call site
/// (registry health probes, plan dispatch) rather than shared, since neither
/// the breaker registry nor the transport's connection pool need to be
/// shared across those two concerns (§4.2, §9: "breakers are per-endpoint").
fn build_caller(config: &a2a_config::AppConfig) -> ResilientCaller {
    ResilientCaller::new(
        CircuitBreakerRegistry::new(config.circuit_breaker_config()),
        config.retry_config(),
        RpcTransport::new(config.pool_config()),
    )
}

/// Background health-probe scheduler (§4.5, SPEC_FULL "Service Registry
/// responsibilities": "health-probe scheduler"; §3 "health-probed every
/// `HEALTH_INTERVAL`"). Ticks on `config.health_interval()` for the life of
/// the process, fanning out through `health_probe_all`.
fn spawn_health_probe_scheduler(registry: Arc<ServiceRegistry>, registry_path: PathBuf, caller: ResilientCaller, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let client = AgentClient::new(&caller);
            if let Err(err) = registry.health_probe_all(&client, &registry_path).await {
                warn!(error = %err, "scheduled health probe failed to persist the registry snapshot");
            }
        }
    });
}

fn print_event(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::MessageAppended { message } => println!("[message] {:?}: {}", message.role, message.content),
        OrchestratorEvent::TaskStarted { task_id, agent } => println!("[task_started] {task_id} -> {agent}"),
        OrchestratorEvent::TaskCompleted { task_id, status } => println!("[task_completed] {task_id}: {status:?}"),
        OrchestratorEvent::PlanCompleted { summary } => println!("[plan_completed] {summary}"),
        OrchestratorEvent::Interrupted { data } => println!("[interrupted] {:?}: {}", data.kind, data.detail),
        OrchestratorEvent::Error { detail } => eprintln!("[error] {detail}"),
        OrchestratorEvent::Response { text } => println!("\n{text}"),
    }
}
