//! digester CLI — run the dispatcher against a pgmq queue.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use digester::config::Config;
use digester::config::secrets::ExposeSecret;
use digester::handler::CommandHandler;
use digester::source::PgmqSource;
use digester::telemetry::{TelemetryConfig, init_telemetry};
use digester::{Digester, DigesterConfig};

#[derive(Parser)]
#[command(name = "digester", about = "Poll a work queue and dispatch items to a worker pool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dispatcher until SIGINT/SIGTERM
    Run {
        /// Executable invoked once per item, content as JSON on stdin
        #[arg(long)]
        command: PathBuf,
        /// Arguments passed to the command
        #[arg(last = true)]
        args: Vec<String>,
        /// Worker count (default: DIGESTER_WORKERS or available parallelism)
        #[arg(long)]
        workers: Option<usize>,
        /// Backoff delay in milliseconds (default: DIGESTER_BACKOFF_MS)
        #[arg(long)]
        backoff_ms: Option<u64>,
        /// Exponential backoff depth; 0 for constant
        #[arg(long)]
        backoff_steps: Option<usize>,
        /// TOML file with engine settings; overrides the environment
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Enqueue a JSON message
    Send {
        /// Message body (JSON)
        payload: String,
        /// Delivery delay in seconds
        #[arg(long, default_value_t = 0)]
        delay: i32,
    },
    /// Create the queue if it does not exist
    CreateQueue,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(
        TelemetryConfig::new("digester")
            .with_endpoint(config.otel_endpoint.clone())
            .with_log_level(&config.log_level),
    )?;

    let source = PgmqSource::connect(config.database_url.expose_secret(), &config.queue)
        .await?
        .with_visibility_timeout(config.visibility_timeout)
        .with_batch_size(config.batch_size);

    match cli.command {
        Command::Run {
            command,
            args,
            workers,
            backoff_ms,
            backoff_steps,
            config: config_file,
        } => {
            let mut engine = match config_file {
                Some(path) => DigesterConfig::from_file(&path)?,
                None => config.digester_config(),
            };
            if let Some(n) = workers {
                engine = engine.with_workers(n);
            }
            if backoff_ms.is_some() || backoff_steps.is_some() {
                let backoff = engine
                    .effective_backoff()
                    .with_overrides(backoff_ms, backoff_steps);
                engine = engine.with_backoff(backoff);
            }
            cmd_run(source, engine, command, args).await
        }
        Command::Send { payload, delay } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            let msg_id = source.send(&payload, delay).await?;
            println!("Sent: {msg_id} (queue: {})", source.queue());
            Ok(())
        }
        Command::CreateQueue => {
            source.create_queue().await?;
            println!("Queue ready: {}", source.queue());
            Ok(())
        }
    }
}

async fn cmd_run(
    source: PgmqSource,
    engine: DigesterConfig,
    command: PathBuf,
    args: Vec<String>,
) -> anyhow::Result<()> {
    source.health_check().await?;
    source.create_queue().await?;

    let handler = args
        .into_iter()
        .fold(CommandHandler::new(&command)?, |h, a| h.arg(a));

    // Always block on signals here, whatever the file said.
    let engine = engine.with_run_mode(digester::RunMode::UntilSignal);
    let digester = Digester::new(source, engine)?;
    digester.start(handler).await?;

    let stats = digester.stats();
    println!(
        "Stopped: {} handled, {} failed, {} retired",
        stats.items_handled, stats.handler_failures, stats.items_retired
    );
    Ok(())
}
