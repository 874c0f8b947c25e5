// crates/flowcli/src/main.rs

mod bundle;

use anyhow::{bail, Result};
use bundle::{parse_params, Bundle};
use clap::{Parser, Subcommand};
use flowcore::{ExecutionEvent, StepEvent};
use flowruntime::FlowEngine;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow Engine CLI", long_about = None)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the bundle's model and run a flow or an event on it
    Run {
        /// Path to bundle JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Flow to apply
        #[arg(long, conflicts_with = "event")]
        flow: Option<String>,

        /// Event to dispatch
        #[arg(long)]
        event: Option<String>,

        /// Invocation params (or event payload) as a JSON object
        #[arg(short, long)]
        params: Option<String>,

        /// Skip the model's auto-apply flows
        #[arg(long)]
        no_auto: bool,
    },

    /// Check that a bundle loads and list its flows
    Validate {
        /// Path to bundle JSON file
        file: PathBuf,
    },

    /// List the standard actions
    Actions,

    /// Write an example bundle
    Init {
        /// Output file path
        #[arg(short, long, default_value = "bundle.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match cli.command {
        Commands::Run {
            file,
            flow,
            event,
            params,
            no_auto,
        } => run_bundle(file, flow, event, params, !no_auto).await?,
        Commands::Validate { file } => validate_bundle(file)?,
        Commands::Actions => list_actions(),
        Commands::Init { output } => create_example_bundle(output)?,
    }

    Ok(())
}

async fn run_bundle(
    file: PathBuf,
    flow: Option<String>,
    event: Option<String>,
    params: Option<String>,
    auto: bool,
) -> Result<()> {
    println!("Loading bundle from: {}", file.display());

    let bundle = Bundle::load(&file)?;
    let params = parse_params(params.as_deref())?;
    let engine = bundle.engine()?;
    tracing::debug!(classes = bundle.classes.len(), actions = engine.action_names().len(), "bundle loaded");

    let mut events = engine.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    let model = engine.create_model(bundle.model_options())?;
    println!("Model: {} ({})", model.uid(), model.class_name());

    if auto {
        engine.apply_auto_flows(&model).await?;
    }

    match (flow, event) {
        (Some(flow_key), _) => {
            let run = engine.apply_flow(&model, &flow_key, params).await?;
            println!(
                "Flow '{}' finished: {} completed, {} skipped",
                run.flow_key,
                run.completed_steps.len(),
                run.skipped_steps.len()
            );
        }
        (None, Some(event_name)) => {
            let report = engine.dispatch_event(&model, &event_name, params).await?;
            if report.is_noop() {
                println!("No flow handles '{}'", event_name);
            } else {
                println!("Event '{}' ran: {}", event_name, report.flow_keys().join(", "));
            }
        }
        (None, None) if !auto => bail!("nothing to do: pass --flow or --event"),
        (None, None) => {}
    }

    // Let the printer drain before exiting
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    printer.abort();

    println!();
    println!("Props:");
    println!("{}", serde_json::to_string_pretty(&model.props())?);

    Ok(())
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::FlowStarted { flow_key, trigger, .. } => {
            println!("> flow {} ({})", flow_key, trigger);
        }
        ExecutionEvent::StepStarted { step_key, .. } => {
            println!("  - {}", step_key);
        }
        ExecutionEvent::StepCompleted {
            step_key, duration_ms, ..
        } => {
            println!("    {} done in {}ms", step_key, duration_ms);
        }
        ExecutionEvent::StepSkipped { step_key, reason, .. } => {
            println!("    {} skipped: {}", step_key, reason);
        }
        ExecutionEvent::StepFailed { step_key, error, .. } => {
            println!("    {} failed: {}", step_key, error);
        }
        ExecutionEvent::StepEvent { event, .. } => match event {
            StepEvent::Info { message } => println!("    {}", message),
            StepEvent::Warning { message } => println!("    warning: {}", message),
            StepEvent::Progress { percent, message } => match message {
                Some(msg) => println!("    {}% {}", percent, msg),
                None => println!("    {}%", percent),
            },
        },
        ExecutionEvent::FlowCompleted {
            flow_key,
            success,
            duration_ms,
            ..
        } => {
            let status = if *success { "completed" } else { "failed" };
            println!("< flow {} {} in {}ms", flow_key, status, duration_ms);
        }
    }
}

fn validate_bundle(file: PathBuf) -> Result<()> {
    println!("Validating bundle: {}", file.display());

    let bundle = Bundle::load(&file)?;
    let engine = bundle.engine()?;

    for class in &bundle.classes {
        let flows = engine.flows(&class.name)?;
        println!("  {} ({} flows)", class.name, flows.len());
        for flow in flows {
            match &flow.on {
                Some(binding) => println!("    {} on '{}'", flow.key, binding.event_name),
                None => println!("    {}", flow.key),
            }
        }
    }

    let unknown = bundle.unknown_actions(&engine);
    for (flow_key, step_key, action) in &unknown {
        println!("  warning: {}.{} uses unknown action '{}' and will be skipped", flow_key, step_key, action);
    }

    println!("Bundle is valid");
    Ok(())
}

fn list_actions() {
    println!("Available actions:");
    println!();

    let engine = FlowEngine::new();
    flowactions::register_all(&engine);

    for name in engine.action_names() {
        let Some(action) = engine.get_action(&name) else {
            continue;
        };
        match &action.title {
            Some(title) => println!("  {} - {}", name, title),
            None => println!("  {}", name),
        }
        if !action.config_schema.is_empty() {
            let fields: Vec<&str> = action.config_schema.fields().map(|(key, _)| key.as_str()).collect();
            println!("    params: {}", fields.join(", "));
        }
    }
}

fn create_example_bundle(output: PathBuf) -> Result<()> {
    let json = serde_json::to_string_pretty(&Bundle::example())?;
    std::fs::write(&output, json)?;

    println!("Created example bundle: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  flow run --file {} --flow increment", output.display());

    Ok(())
}
