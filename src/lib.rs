// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod host;
pub mod input;
pub mod logging;
pub mod message;
pub mod script;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::config::model::NodeConfig;
use crate::engine::{ExecEngine, Runtime, RuntimeEvent};
use crate::exec::sink::{spawn_line_writer, ChannelSink, LaneMessage};
use crate::host::HostServices;

const WRITER_DRAIN: Duration = Duration::from_secs(5);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the exec engine and its output writer
/// - the input reader (stdin or `--input`)
/// - runtime event loop
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config '{}'", args.config))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let (out_tx, out_rx) = mpsc::channel::<LaneMessage>(256);
    let writer = spawn_line_writer(out_rx, tokio::io::stdout());

    let host = HostServices::local(&cfg.name);
    let engine = Arc::new(ExecEngine::new(cfg, Arc::new(ChannelSink::new(out_tx)), host));

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let reader = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening input '{path}'"))?;
            tokio::spawn(input::pump_events(file, rt_tx))
        }
        None => tokio::spawn(input::pump_events(tokio::io::stdin(), rt_tx)),
    };

    let runtime = Runtime::new(rt_rx, Arc::clone(&engine));
    runtime.run().await?;

    // The reader may still be blocked on stdin after a shutdown.
    if reader.is_finished() {
        match reader.await {
            Ok(Err(e)) => warn!(error = %e, "input reader failed"),
            Ok(Ok(count)) => debug!(events = count, "input reader finished"),
            Err(_) => {}
        }
    } else {
        reader.abort();
    }

    // Dropping the engine drops the last output sender, which ends the writer.
    // Output readers of killed processes may linger if a grandchild holds the
    // pipe open, so the wait is bounded.
    drop(engine);
    match tokio::time::timeout(WRITER_DRAIN, writer).await {
        Ok(Ok(res)) => res?,
        Ok(Err(e)) => warn!(error = %e, "output writer task failed"),
        Err(_) => warn!("output writer did not finish in time; exiting anyway"),
    }

    debug!("execlane finished");
    Ok(())
}

/// Simple dry-run output: print the resolved configuration.
fn print_dry_run(cfg: &NodeConfig) {
    println!("execlane dry-run");
    println!("  name: {}", cfg.name);
    if cfg.command.trim().is_empty() {
        println!("  command: <none> (every invocation will fail with \"no command\")");
    } else {
        println!("  command: {}", cfg.command);
    }
    if !cfg.args.is_empty() {
        println!("  args: {}", cfg.args);
    }
    println!("  arguments_source: msg.{}", cfg.arguments_source);
    if let Some(ref env) = cfg.env_source {
        println!("  env_source: msg.{env}");
    }
    if let Some(ref cwd) = cfg.cwd {
        println!("  cwd: {cwd}");
    }
    println!("  input: {:?}", cfg.input);
    println!("  result_field: msg.{}", cfg.result_field);
    println!("  send_start_control: {}", cfg.send_start_control);
    match cfg.thresholds.warning {
        Some(w) => println!("  thresholds: warning >= {w}, error >= {}", cfg.thresholds.error),
        None => println!("  thresholds: error >= {}", cfg.thresholds.error),
    }
    println!(
        "  scripts: pre={} post={} timeout={}ms",
        cfg.pre_script.is_some(),
        cfg.post_script.is_some(),
        cfg.script_timeout.as_millis()
    );
    println!("  shutdown grace: {}ms", cfg.shutdown_grace.as_millis());

    info!("dry-run complete (no execution)");
}
