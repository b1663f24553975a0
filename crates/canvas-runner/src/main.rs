//! Canvas Runner
//!
//! Loads a saved canvas graph, executes one node (pulling whatever it
//! needs), prints every engine event as a JSON line, and writes the graph
//! back.
//!
//! ```text
//! canvas-runner graph.json imageGen1 --config runner.json
//! ```

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use canvas_engine::{
    ChannelEventSink, EngineError, EngineEvent, ExecutionOutcome, ExecutorExtensions, FlowEngine,
    GraphSnapshot,
};
use canvas_nodes::{builtin_registry, extension_keys, CanvasNode, GenerationProvider};
use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;

use config::{ConfigError, RunnerConfig};

#[derive(Debug, Parser)]
#[command(name = "canvas-runner", about = "Run one node of a saved canvas graph")]
struct Cli {
    /// Saved graph (JSON snapshot)
    graph: PathBuf,

    /// Id of the node to execute
    node: String,

    /// Runner configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not write the graph back after running
    #[arg(long)]
    no_save: bool,
}

#[derive(Debug, thiserror::Error)]
enum RunnerError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the node completed
async fn run(cli: Cli) -> Result<bool, RunnerError> {
    let config = RunnerConfig::load(cli.config.as_deref()).await?;
    log::info!("Using generation backend at {}", config.provider.base_url);

    let provider: Arc<dyn GenerationProvider> = Arc::new(config.provider.build());
    let (sink, events) = ChannelEventSink::new();
    let engine = FlowEngine::new(builtin_registry(), config.engine.clone())
        .with_extensions(
            ExecutorExtensions::new().with(extension_keys::GENERATION_PROVIDER, provider),
        )
        .with_event_sink(Arc::new(sink));

    let snapshot = GraphSnapshot::<CanvasNode>::load(&cli.graph).await?;
    engine.restore(snapshot).await?;

    let result = engine.execute(&cli.node).await;

    // Background cascades may still be running
    engine.wait_all_idle().await;

    print_events(events);

    if !cli.no_save {
        engine.snapshot().await.save(&cli.graph).await?;
        log::info!("Saved graph to {:?}", cli.graph);
    }

    match result? {
        ExecutionOutcome::Completed(_) => {
            log::info!("Node '{}' completed", cli.node);
            Ok(true)
        }
        ExecutionOutcome::Blocked => {
            log::warn!("Node '{}' is blocked by an out-of-date input", cli.node);
            Ok(false)
        }
        ExecutionOutcome::AlreadyRunning | ExecutionOutcome::Discarded => {
            log::warn!("Node '{}' did not produce a result", cli.node);
            Ok(false)
        }
    }
}

fn print_events(mut events: UnboundedReceiver<EngineEvent>) {
    while let Ok(event) = events.try_recv() {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{}", line),
            Err(e) => log::warn!("Failed to serialize event: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        let cli = Cli::parse_from(["canvas-runner", "graph.json", "g1", "--config", "r.json"]);
        assert_eq!(cli.graph, PathBuf::from("graph.json"));
        assert_eq!(cli.node, "g1");
        assert_eq!(cli.config, Some(PathBuf::from("r.json")));
        assert!(!cli.no_save);
    }

    #[tokio::test]
    async fn test_runs_reactive_graph() {
        let dir = tempfile::tempdir().unwrap();
        let graph = dir.path().join("graph.json");
        tokio::fs::write(
            &graph,
            r#"{
                "nodes": [
                    {"id": "n", "state": {"type": "number", "value": 4}, "isOutOfDate": true},
                    {"id": "sum", "state": {"type": "arithmetic", "operator": "add", "a": 0, "b": 1}, "isOutOfDate": true}
                ],
                "connections": [
                    {"source": {"nodeId": "n", "portId": "output"}, "sink": {"nodeId": "sum", "portId": "a"}}
                ]
            }"#,
        )
        .await
        .unwrap();

        let cli = Cli::parse_from([
            "canvas-runner",
            graph.to_str().unwrap(),
            "sum",
            "--config",
            dir.path().join("missing.json").to_str().unwrap(),
        ]);
        assert!(run(cli).await.unwrap());

        let saved = GraphSnapshot::<CanvasNode>::load(&graph).await.unwrap();
        let sum = saved.nodes.iter().find(|n| n.id == "sum").unwrap();
        assert!(!sum.is_out_of_date);
        assert_eq!(sum.outputs.value("output"), Some(&serde_json::json!(5.0)));
    }

    #[tokio::test]
    async fn test_saves_background_cascade_results() {
        let dir = tempfile::tempdir().unwrap();
        let graph = dir.path().join("graph.json");
        let config = dir.path().join("runner.json");
        tokio::fs::write(&config, r#"{"engine": {"cascade": "auto"}}"#)
            .await
            .unwrap();
        tokio::fs::write(
            &graph,
            r#"{
                "nodes": [
                    {"id": "n", "state": {"type": "number", "value": 4}, "isOutOfDate": true},
                    {"id": "sum", "state": {"type": "arithmetic", "operator": "add", "a": 0, "b": 1}, "isOutOfDate": true},
                    {"id": "product", "state": {"type": "arithmetic", "operator": "multiply", "a": 0, "b": 3}, "isOutOfDate": true}
                ],
                "connections": [
                    {"source": {"nodeId": "n", "portId": "output"}, "sink": {"nodeId": "sum", "portId": "a"}},
                    {"source": {"nodeId": "sum", "portId": "output"}, "sink": {"nodeId": "product", "portId": "a"}}
                ]
            }"#,
        )
        .await
        .unwrap();

        let cli = Cli::parse_from([
            "canvas-runner",
            graph.to_str().unwrap(),
            "n",
            "--config",
            config.to_str().unwrap(),
        ]);
        assert!(run(cli).await.unwrap());

        let saved = GraphSnapshot::<CanvasNode>::load(&graph).await.unwrap();
        let product = saved.nodes.iter().find(|n| n.id == "product").unwrap();
        assert!(!product.is_out_of_date);
        assert_eq!(product.outputs.value("output"), Some(&serde_json::json!(15.0)));
    }

    #[tokio::test]
    async fn test_unknown_node_fails() {
        let dir = tempfile::tempdir().unwrap();
        let graph = dir.path().join("graph.json");
        tokio::fs::write(&graph, r#"{"nodes": []}"#).await.unwrap();

        let cli = Cli::parse_from(["canvas-runner", graph.to_str().unwrap(), "ghost", "--no-save"]);
        let err = run(cli).await.unwrap_err();
        assert!(matches!(err, RunnerError::Engine(EngineError::NodeNotFound(_))));
    }
}
