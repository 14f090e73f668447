use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};

use docflow::config::Config;
use docflow::flow::Flow;
use docflow::logging;
use docflow::processing::{FlowError, FlowOutcome, FlowRunner, Upload};

#[derive(Parser)]
#[command(
    name = "docflow-run",
    about = "Run one flow against a local document and print the result as JSON"
)]
struct Cli {
    /// Flow graph JSON, as exported by the editor.
    #[arg(long)]
    flow: PathBuf,
    /// Document to process.
    #[arg(long)]
    file: PathBuf,
    /// Pretty-print the JSON result.
    #[arg(long)]
    pretty: bool,
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(1);
        }
    }
}

/// Returns whether the flow produced an outcome.
fn run() -> Result<bool> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_cli_tracing();
    let config = Config::from_env().context("failed to load configuration")?;

    let raw = fs::read_to_string(&cli.flow)
        .with_context(|| format!("failed to read flow {}", cli.flow.display()))?;
    let flow = Flow::from_json(&raw)
        .with_context(|| format!("invalid flow JSON in {}", cli.flow.display()))?;
    let bytes = fs::read(&cli.file)
        .with_context(|| format!("failed to read document {}", cli.file.display()))?;
    let filename = cli
        .file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();

    let runner = FlowRunner::new(config.runner_settings());
    let result = runner.run(&flow, Upload::new(filename, bytes));
    let succeeded = result.is_ok();
    let body = render(result)?;

    let text = if cli.pretty {
        serde_json::to_string_pretty(&body)
    } else {
        serde_json::to_string(&body)
    }
    .context("failed to serialize result")?;
    println!("{text}");
    Ok(succeeded)
}

fn render(result: Result<FlowOutcome, FlowError>) -> Result<Value> {
    match result {
        Ok(outcome) => {
            let mut body = serde_json::to_value(&outcome).context("failed to encode outcome")?;
            if let Value::Object(map) = &mut body {
                map.insert("status".into(), json!("ok"));
            }
            Ok(body)
        }
        Err(err) => {
            let mut body = json!({
                "status": "error",
                "error": err.tag(),
                "detail": err.to_string(),
            });
            if let Some(node_id) = err.node_id() {
                body["node_id"] = json!(node_id);
            }
            Ok(body)
        }
    }
}
