//! Arcanum CLI — the main entry point.
//!
//! Commands:
//! - `backends` — list the backends available in the current environment
//! - `read`     — run a reading for a payload JSON file

use anyhow::Context;
use arcanum_backends::{list_available, run_backend, run_with_fallback, ReadingOutcome};
use arcanum_config::Settings;
use arcanum_core::reading::ReadingPayload;
use arcanum_privacy::{build_persistable_payload, RedactionOptions};
use arcanum_telemetry::{StorageMode, TelemetryRecord};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "arcanum",
    about = "Arcanum — budgeted, privacy-safe prompt dispatch for readings",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List backends available in the current environment
    Backends,

    /// Run a reading from a payload JSON file
    Read {
        /// Path to the reading payload (JSON)
        #[arg(short, long)]
        payload: PathBuf,

        /// Pin a specific backend instead of walking the fallback chain
        #[arg(short, long)]
        backend: Option<String>,

        /// Where to write the persisted record (requires persistence enabled)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Backends => backends_command(),
        Commands::Read {
            payload,
            backend,
            out,
        } => read_command(payload, backend, out).await,
    }
}

fn resolve_environment() -> anyhow::Result<arcanum_config::Environment> {
    let settings = Settings::load().context("loading settings")?;
    let mut env = settings.environment();
    // Process environment wins over the settings file.
    for (key, value) in std::env::vars() {
        if key.starts_with("ARCANUM_") || key.ends_with("_API_KEY") {
            env.set(key, value);
        }
    }
    Ok(env)
}

fn backends_command() -> anyhow::Result<()> {
    let env = resolve_environment()?;
    for descriptor in list_available(&env) {
        println!("{:<12} {}", descriptor.id, descriptor.label);
    }
    Ok(())
}

async fn read_command(
    payload_path: PathBuf,
    backend: Option<String>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let env = resolve_environment()?;

    let raw = std::fs::read_to_string(&payload_path)
        .with_context(|| format!("reading payload file {}", payload_path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw).context("parsing payload JSON")?;
    let mut payload = ReadingPayload::from_json(value).context("validating payload")?;
    payload.env = env.clone();

    let request_id = uuid::Uuid::new_v4().to_string();
    let started = std::time::Instant::now();

    let result = match &backend {
        Some(id) => run_backend(id, &env, &payload, &request_id).await,
        None => run_with_fallback(&env, &payload, &request_id).await,
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if env.persistence_enabled() {
                let mode = env
                    .get(arcanum_config::KEY_TELEMETRY_DETAIL)
                    .map(StorageMode::parse)
                    .unwrap_or_default();
                let record = TelemetryRecord::new(
                    &request_id,
                    "reading",
                    backend.as_deref().unwrap_or("fallback-chain"),
                    "",
                    payload.tier.to_string(),
                )
                .with_error("backend-failure", &e.to_string(), mode);
                emit_document(&serde_json::json!({ "record": record }), out.as_deref())?;
            }
            return Err(e.into());
        }
    };

    // Merge the diagnostics each stage returned into the request accumulator.
    payload
        .diagnostics
        .extend(outcome.prompts.diagnostics.iter().cloned());

    println!("{}", outcome.reading);

    if env.prompt_logging_enabled() {
        tracing::debug!(
            system = %outcome.prompts.system_prompt,
            user = %outcome.prompts.user_prompt,
            "assembled prompts"
        );
    }

    if env.persistence_enabled() {
        let record = build_record(&payload, &outcome, &request_id, started.elapsed());
        let redaction = RedactionOptions {
            display_name: payload.personalization.display_name.clone(),
            ..Default::default()
        };
        let prompt_capture = build_persistable_payload(
            &outcome.prompts.system_prompt,
            &outcome.prompts.user_prompt,
            &redaction,
        );

        let document = serde_json::json!({
            "record": record,
            "prompt": prompt_capture,
        });
        emit_document(&document, out.as_deref())?;
    }

    Ok(())
}

fn emit_document(document: &serde_json::Value, out: Option<&std::path::Path>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, serde_json::to_vec_pretty(document)?)
                .with_context(|| format!("writing record to {}", path.display()))?;
            tracing::info!(path = %path.display(), "persisted telemetry record");
        }
        None => eprintln!("{}", serde_json::to_string_pretty(document)?),
    }
    Ok(())
}

fn build_record(
    payload: &ReadingPayload,
    outcome: &ReadingOutcome,
    request_id: &str,
    elapsed: std::time::Duration,
) -> TelemetryRecord {
    let meta = &outcome.prompts.meta;
    let mut record = TelemetryRecord::new(
        request_id,
        "reading",
        outcome.backend_id,
        outcome.model.clone(),
        payload.tier.to_string(),
    );
    record.input.system_tokens = meta.estimated_tokens.system;
    record.input.user_tokens = meta.estimated_tokens.user;
    record.input.budget = meta.estimated_tokens.budget;
    record.input.slimming_steps = meta.step_names().iter().map(|s| s.to_string()).collect();
    record.output.completion_tokens = outcome.usage.map(|u| u.completion_tokens).unwrap_or(0);
    record.output.reading_length = outcome.reading.len();
    record.output.section_count = outcome.reading.split("\n\n").count();
    record.timing.total_ms = elapsed.as_millis() as u64;
    record
}
