use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uasr_core::PipelineConfig;
use uasr_runner::{stages, PipelineContext};

#[derive(Parser)]
#[command(name = "uasr", version, about = "Unsupervised ASR pipeline driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build audio manifests and strip silence from the dataset.
    Setup {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Prepare features and text, then train the GAN and transcribe.
    Train {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Kaldi HMM self-training over the GAN transcriptions.
    SelfTrain {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Show the recorded status of every step.
    Status {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Rewrite the checkpoint file to one line per step.
    Compact {
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Setup { config, json } => {
            let ctx = load_context(&config)?;
            stages::run_setup(&ctx)?;
            stage_report("setup", &ctx, json)
        }
        Commands::Train { config, json } => {
            let ctx = load_context(&config)?;
            stages::run_train(&ctx)?;
            stage_report("train", &ctx, json)
        }
        Commands::SelfTrain { config, json } => {
            let ctx = load_context(&config)?;
            stages::run_self_train(&ctx)?;
            stage_report("self-train", &ctx, json)
        }
        Commands::Status { config, json } => {
            let ctx = load_context(&config)?;
            let statuses = ctx.store.statuses();
            if json {
                let steps: Vec<Value> = statuses
                    .iter()
                    .map(|(name, status)| json!({ "step": name, "status": status.as_str() }))
                    .collect();
                return Ok(Some(json!({
                    "ok": true,
                    "command": "status",
                    "checkpoint": ctx.store.path().display().to_string(),
                    "steps": steps
                })));
            }
            if statuses.is_empty() {
                println!("no steps recorded yet");
            }
            for (name, status) in statuses {
                println!("{}: {}", name, status.as_str());
            }
            Ok(None)
        }
        Commands::Compact { config, json } => {
            let ctx = load_context(&config)?;
            let kept = ctx.store.compact()?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "compact",
                    "checkpoint": ctx.store.path().display().to_string(),
                    "steps": kept
                })));
            }
            println!("compacted: {} steps", kept);
            Ok(None)
        }
    }
}

fn load_context(config: &PathBuf) -> Result<PipelineContext> {
    let config = PipelineConfig::load(config)?;
    PipelineContext::new(config)
}

fn stage_report(stage: &str, ctx: &PipelineContext, json: bool) -> Result<Option<Value>> {
    if json {
        let steps: Vec<Value> = ctx
            .store
            .statuses()
            .iter()
            .map(|(name, status)| json!({ "step": name, "status": status.as_str() }))
            .collect();
        return Ok(Some(json!({
            "ok": true,
            "command": stage,
            "output_dir": ctx.config.output_dir.display().to_string(),
            "steps": steps
        })));
    }
    println!("{}: done", stage);
    println!("output_dir: {}", ctx.config.output_dir.display());
    Ok(None)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Setup { json, .. }
        | Commands::Train { json, .. }
        | Commands::SelfTrain { json, .. }
        | Commands::Status { json, .. }
        | Commands::Compact { json, .. } => *json,
    }
}
