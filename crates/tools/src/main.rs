use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use lifecycle::http::HttpDatasetSource;
use lifecycle::{
    ControllerConfig, DatasetFetcher, HeadlessBackend, LifecycleController, ManualSignals,
    MapSession, MemoryScope, SampleDataset, Trigger,
};
use runtime::TokioExecutor;
use tokio::task::LocalSet;
use tools::{Report, parse_script, run_script};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Drive the map lifecycle against a running server")]
struct Args {
    /// Base URL of the map REST API
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    base_url: String,

    /// Steps to run, e.g. "mount,refresh,unmount+mount,sleep:100"
    #[arg(long, default_value = "mount")]
    script: String,

    /// Pause between teardown and the next fetch, in milliseconds
    #[arg(long, default_value_t = 50)]
    settle_ms: u64,

    /// Give up on a fetch after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Fail instead of falling back to the built-in sample data
    #[arg(long)]
    no_fallback: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let steps = parse_script(&args.script)?;

    let config = ControllerConfig {
        fallback_enabled: !args.no_fallback,
        settle_delay: Duration::from_millis(args.settle_ms),
        fetch_timeout: args.timeout_ms.map(Duration::from_millis),
        ..ControllerConfig::default()
    };
    let backend = HeadlessBackend::new();
    let scope = MemoryScope::new();
    let controller = LifecycleController::new(config, backend.clone(), scope.clone(), SampleDataset);
    let session = MapSession::new(
        controller,
        DatasetFetcher::new(Rc::new(HttpDatasetSource::new(&args.base_url))),
        Rc::new(TokioExecutor),
    );
    let signals = ManualSignals::new();
    session.attach_signals(signals.clone())?;
    info!(base_url = %args.base_url, steps = steps.len(), "running script");

    let local = LocalSet::new();
    local
        .run_until(async {
            for report in run_script(&session, &signals, &steps).await {
                match report {
                    Report::Dispatched(outcome) => println!("outcome  {outcome:?}"),
                    Report::Signalled { signal, listeners } => {
                        println!("signal   {signal:?} -> {listeners} listener(s)")
                    }
                }
            }
            session.dispatch(Trigger::Teardown).await;
        })
        .await;

    session.with_controller(|c| {
        for event in c.events().events() {
            println!(
                "{:>4}  {:<10} {:<6} {}",
                event.seq, event.kind, event.session, event.message
            );
        }
        for (name, value) in c.metrics().snapshot() {
            println!("metric   {name} = {value}");
        }
        println!(
            "peak live handles {}",
            c.metrics().peak("live_handles")
        );
    });
    println!(
        "teardown: listeners={} live={} document_clean={}",
        signals.listener_count(),
        backend.live_count(),
        scope.is_pristine()
    );
    Ok(())
}
