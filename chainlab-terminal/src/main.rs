//! chainlab: simulated Solana developer terminal

use std::sync::Arc;
use std::time::Duration;

use chainlab_runner::{Dispatcher, HttpWorker, JobWorker, LocalWorker};
use chainlab_sim::persistence::{self, SessionStorage};
use chainlab_sim::{CommandRegistry, Mission, Session};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chainlab_terminal::{run_repl, Args, FileStorage, Terminal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr so they never mix with simulated output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chainlab={},warn", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let storage: Arc<dyn SessionStorage> = Arc::new(FileStorage::new(&args.data_dir));
    if args.reset {
        storage.clear()?;
        info!(data_dir = %args.data_dir.display(), "Cleared saved session");
    }

    let registry = Arc::new(CommandRegistry::new());
    let seed = args.seed.clone();
    let session = persistence::load_or_default(storage.as_ref(), registry, |registry| match seed {
        Some(seed) => Session::new(seed, chrono::Utc::now(), registry),
        None => Session::fresh(registry),
    });
    info!(seed = session.seed(), commands = session.history().len(), "Session ready");

    let worker: Arc<dyn JobWorker> = match &args.runner_url {
        Some(url) => Arc::new(HttpWorker::new(url.clone(), args.runner_secret.clone())?),
        None => Arc::new(LocalWorker::new(
            args.toolchain(),
            Duration::from_millis(args.job_timeout_ms),
        )),
    };
    info!(worker = %worker.id(), "Runner configured");
    let dispatcher = Arc::new(Dispatcher::new(worker, args.dispatcher_config()));

    let mut terminal = Terminal::new(session, storage, dispatcher);
    if let Some(path) = &args.mission {
        terminal = terminal.with_mission(Mission::from_file(path)?);
    }

    let stdin = BufReader::new(tokio::io::stdin());
    run_repl(&mut terminal, stdin, tokio::io::stdout()).await?;
    Ok(())
}
