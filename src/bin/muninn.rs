//! muninn: pipeline playground
//!
//! Runs a recorded transcript through a configured pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use muninn::providers::RecordedModel;
use muninn::types::{CallParameters, Message, StreamEvent};
use muninn::{Pipeline, PipelineConfig};

/// Muninn pipeline CLI
#[derive(Parser)]
#[command(name = "muninn")]
#[command(version = muninn::PKG_VERSION)]
#[command(about = "Run LLM middleware pipelines against recorded transcripts")]
struct Args {
    /// Pipeline config file (default: ~/.muninn/pipeline.toml, then /etc/muninn/pipeline.toml)
    #[arg(short, long, env = "MUNINN_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play a JSONL transcript of stream events through the pipeline
    Run {
        /// Transcript file, one serialized event per line
        #[arg(short, long)]
        transcript: PathBuf,
        /// User message sent with each call
        #[arg(short, long, default_value = "hello")]
        prompt: String,
        /// Use the streaming path instead of generate
        #[arg(long)]
        stream: bool,
        /// Number of identical calls (repeats show cache replay)
        #[arg(short = 'n', long, default_value_t = 1)]
        repeat: u32,
        /// Delay between transcript events in milliseconds
        #[arg(long, default_value_t = 0)]
        chunk_delay_ms: u64,
    },

    /// Print the effective pipeline configuration
    Config,

    /// Print build information
    Version,
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
        Command::Version => {
            println!("{}", serde_json::to_string_pretty(&muninn::version::build_info())?);
        }

        Command::Config => {
            let config = PipelineConfig::load(args.config.as_deref())?;
            print!("{}", config.to_toml_string()?);
        }

        Command::Run {
            transcript,
            prompt,
            stream,
            repeat,
            chunk_delay_ms,
        } => {
            let config = PipelineConfig::load(args.config.as_deref())?;
            let model = RecordedModel::from_jsonl("recorded", &transcript)?
                .with_chunk_delay(Duration::from_millis(chunk_delay_ms));
            let model = Arc::new(model);
            let pipeline = Pipeline::from_config(model.clone(), &config, None)?;
            println!("layers: {}", pipeline.layer_names().join(" > "));

            let params = CallParameters::new(vec![Message::user(prompt)]);
            for run in 1..=repeat {
                let start = Instant::now();
                println!("--- run {run}");
                if stream {
                    run_stream(&pipeline, params.clone()).await?;
                } else {
                    let result = pipeline.generate(params.clone()).await?;
                    if let Some(reasoning) = &result.reasoning {
                        println!("reasoning: {reasoning}");
                    }
                    println!("content:   {}", result.text);
                    println!("finish:    {:?}", result.finish_reason);
                }
                println!(
                    "elapsed:   {:?} (model calls so far: {})",
                    start.elapsed(),
                    model.calls()
                );
            }
        }
    }

    Ok(())
}

async fn run_stream(
    pipeline: &Pipeline,
    params: CallParameters,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut result = pipeline.stream(params).await?;
    if result.raw_call.is_cached() {
        println!("(replayed from cache)");
    }

    let mut reasoning = String::new();
    let mut content = String::new();
    while let Some(event) = result.stream.next().await {
        match event {
            StreamEvent::ReasoningDelta(text) => reasoning.push_str(&text),
            StreamEvent::TextDelta(text) => content.push_str(&text),
            StreamEvent::ToolCallDelta(delta) => {
                println!("tool call #{}: {:?} {}", delta.index, delta.name, delta.arguments);
            }
            StreamEvent::Finish { reason, usage } => {
                println!("finish:    {reason:?} {usage:?}");
            }
            StreamEvent::Error(error) => {
                println!("error:     {}", error.message);
            }
        }
    }
    if !reasoning.is_empty() {
        println!("reasoning: {reasoning}");
    }
    println!("content:   {content}");
    Ok(())
}
