//! Thin process wrapper around the n3n workflow engine crates: load a flow
//! definition from disk, validate it, run it in-process, and exercise the
//! export/import and secure-channel flows without an external storage or
//! transport layer.

mod config;
mod flowfile;
mod handlers;
mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use n3n_core::{FlowId, FlowVersionId, TriggerType, UserId};
use n3n_engine::{Engine, PublishedFlowVersion, StorageBackend};
use n3n_execution::EngineConfig;
use n3n_export::{
    credential_placeholders, import, ComponentDependency, Dependencies, ExportPackage, FlowSettings, FlowSnapshot,
    ImportRequest,
};
use n3n_registry::HandlerRegistry;
use n3n_secure_channel::{complete, derive_keys, mint, open, receive, seal, send, Direction, EphemeralKeypair, Envelope, Header, RegistrationRequest};
use n3n_stream::StreamHub;
use rand::RngCore;
use x25519_dalek::PublicKey;
use zeroize::Zeroizing;

use crate::flowfile::FlowFile;
use crate::handlers::{DelayHandler, EchoHandler, HttpStubHandler, LogHandler};
use crate::storage::{InMemoryStorage, NoopCredentialResolver};

#[derive(Parser)]
#[command(name = "n3n", about = "Workflow automation platform: validate, run, export and import flows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and structurally validate a flow file.
    Validate { file: PathBuf },
    /// Run a flow file to completion and print its execution trace.
    Run {
        file: PathBuf,
        /// JSON trigger input, defaults to `{}`.
        #[arg(long)]
        input: Option<String>,
    },
    /// Export a flow file to a checksummed package.
    Export {
        file: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Import a package, printing the resolved flow name and import record.
    Import {
        package: PathBuf,
        #[arg(long)]
        new_name: Option<String>,
    },
    /// Exercise the secure device channel's pairing and messaging round trip locally.
    Device {
        #[command(subcommand)]
        action: DeviceAction,
    },
}

#[derive(Subcommand)]
enum DeviceAction {
    /// Mint a registration token, pair a simulated agent, and exchange one message in each direction.
    Demo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env();
    config.init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { file } => cmd_validate(&file),
        Command::Run { file, input } => cmd_run(&file, input).await,
        Command::Export { file, out } => cmd_export(&file, &out),
        Command::Import { package, new_name } => cmd_import(&package, new_name),
        Command::Device { action: DeviceAction::Demo } => cmd_device_demo(),
    }
}

fn cmd_validate(file: &Path) -> anyhow::Result<()> {
    let flow = FlowFile::load(file)?;
    let parse = n3n_dag::validate(&flow.definition, None);
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "valid": parse.valid,
        "executionOrder": parse.execution_order,
        "warnings": parse.warnings,
        "errors": parse.errors,
    }))?);
    if !parse.valid {
        anyhow::bail!("flow definition is invalid");
    }
    Ok(())
}

async fn cmd_run(file: &Path, input: Option<String>) -> anyhow::Result<()> {
    let flow = FlowFile::load(file)?;
    let parse = n3n_dag::validate(&flow.definition, None);
    if !parse.valid {
        anyhow::bail!("flow definition is invalid: {}", parse.errors.join("; "));
    }

    let trigger_input: serde_json::Value = match input {
        Some(raw) => serde_json::from_str(&raw)?,
        None => serde_json::json!({}),
    };

    let registry = HandlerRegistry::new();
    registry.register_or_replace(Arc::new(EchoHandler::new("trigger")));
    registry.register_or_replace(Arc::new(EchoHandler::new("scheduleTrigger")));
    registry.register_or_replace(Arc::new(EchoHandler::new("webhook")));
    registry.register_or_replace(Arc::new(EchoHandler::new("output")));
    registry.register_or_replace(Arc::new(LogHandler));
    registry.register_or_replace(Arc::new(DelayHandler));
    registry.register_or_replace(Arc::new(HttpStubHandler));

    let flow_id = FlowId::v4();
    let published = PublishedFlowVersion {
        flow_version_id: FlowVersionId::v4(),
        definition: flow.definition.clone(),
        settings: flow.settings.clone(),
    };
    let storage = Arc::new(InMemoryStorage::with_single_flow(flow_id, published));
    let storage_backend: Arc<dyn StorageBackend> = storage.clone();

    let engine = Engine::new(
        EngineConfig::default(),
        Arc::new(registry),
        Arc::new(NoopCredentialResolver),
        storage_backend,
        Arc::new(StreamHub::new()),
    );

    let execution_id = engine.start_execution(flow_id, TriggerType::Manual, None, trigger_input).await?;
    println!("started execution {execution_id}");

    let subscription = engine.subscribe(execution_id);
    while let Some(event) = subscription.recv().await {
        println!("{}", serde_json::to_string(&event)?);
        if matches!(event, n3n_stream::StreamEvent::ExecutionCompleted { .. } | n3n_stream::StreamEvent::Overflow { .. }) {
            break;
        }
    }

    if let Some(execution) = storage.execution(execution_id) {
        println!("\nfinal status: {}", execution.status);
        for node in storage.node_executions_for(execution_id) {
            println!("  node {} -> {}", node.node_id, node.status);
        }
    }

    Ok(())
}

fn cmd_export(file: &Path, out: &Path) -> anyhow::Result<()> {
    let flow = FlowFile::load(file)?;
    let placeholders = credential_placeholders(&flow.definition);
    let snapshot = FlowSnapshot {
        name: flow.name,
        description: flow.description,
        definition: flow.definition,
        settings: FlowSettings { concurrency: flow.settings.concurrency_cap as u32, max_execution_time_ms: flow.settings.execution_timeout_ms },
    };
    let dependencies = Dependencies { components: Vec::<ComponentDependency>::new(), credential_placeholders: placeholders };
    let package = ExportPackage::new(UserId::v4(), snapshot, dependencies, Utc::now())?;
    let json = serde_json::to_string_pretty(&package)?;
    std::fs::write(out, json)?;
    println!("exported to {} (checksum {})", out.display(), package.checksum);
    Ok(())
}

fn cmd_import(package_path: &Path, new_name: Option<String>) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(package_path)?;
    let package: ExportPackage = serde_json::from_str(&raw)?;
    let request = ImportRequest { new_flow_name: new_name, credential_mappings: std::collections::HashMap::new() };
    let result = import(&package, &request, |_name| false, Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "flowId": result.flow_id,
        "flowName": result.flow_name,
        "status": result.status,
        "importRecord": result.record,
    }))?);
    Ok(())
}

/// Mints a token, pairs a simulated agent against it, then seals and opens
/// one message in each direction — entirely in-process, with no websocket
/// transport or persisted device store involved.
fn cmd_device_demo() -> anyhow::Result<()> {
    let now = Utc::now();
    let user_id = UserId::v4();
    let (token, record) = mint(user_id, now);
    println!("minted registration token for user {user_id}");

    let agent_keypair = EphemeralKeypair::generate();
    let device_id = n3n_core::DeviceId::v4();
    let request = RegistrationRequest {
        token,
        device_id,
        device_name: "demo-agent".to_string(),
        platform: "linux".to_string(),
        device_fingerprint: "demo-fingerprint".to_string(),
        device_public_key: agent_keypair.public.to_bytes(),
    };

    let (mut server_device_key, response) = complete(&request, &record, "platform-fingerprint".to_string(), now)?;
    println!("registration complete, device {device_id} paired");

    let platform_public = PublicKey::from(response.platform_public_key);
    let shared_secret = agent_keypair.diffie_hellman(&platform_public);
    let agent_keys = derive_keys(&shared_secret, device_id.as_bytes(), user_id.as_bytes());
    let agent_enc_key_c2s: Zeroizing<[u8; 32]> = Zeroizing::new(agent_keys.enc_key_c2s);
    let agent_enc_key_s2c: Zeroizing<[u8; 32]> = Zeroizing::new(agent_keys.enc_key_s2c);

    let mut nonce = [0u8; 12];
    rand::rng().fill_bytes(&mut nonce);
    let header = Header::new(device_id, Utc::now(), 1, nonce, Direction::C2s);
    let aad = header.canonical_bytes()?;
    let combined = seal(&agent_enc_key_c2s, &nonce, &aad, b"hello from the agent")?;
    let envelope = Envelope::from_combined(header, &combined)?;
    let wire = envelope.encode()?;

    let plaintext = receive(&wire, &mut server_device_key, Utc::now())?;
    println!("server received: {}", String::from_utf8_lossy(&plaintext));

    let reply_wire = send(&mut server_device_key, b"hello back from the platform", Utc::now())?;
    let reply_envelope = Envelope::decode(&reply_wire)?;
    let reply_aad = reply_envelope.header.canonical_bytes()?;
    let reply_nonce = reply_envelope.header.nonce_bytes()?;
    let reply_plaintext = open(&agent_enc_key_s2c, &reply_nonce, &reply_aad, &reply_envelope.combined())?;
    println!("agent received: {}", String::from_utf8_lossy(&reply_plaintext));

    Ok(())
}
