use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use maplooper_core::{
    NullHost, ParameterBank, Runtime, SessionConfig, SignalId, UpdateQueue, UpdateSender,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

fn main() -> maplooper_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Signals { config } => print_signals(config.as_deref()),
        Commands::DemoConfig => {
            println!("{}", SessionConfig::demo().to_json_pretty()?);
            Ok(())
        }
    }
}

fn run(args: RunArgs) -> maplooper_core::Result<()> {
    let session = load_session(args.config.as_deref())?;
    let mut runtime = Runtime::from_session(&session, ParameterBank::new())?;
    tracing::info!(
        loops = runtime.loops().len(),
        routes = runtime.router().len(),
        ticks = args.ticks,
        period_ms = args.period_ms,
        "starting session"
    );

    let names: Vec<String> = runtime
        .loops()
        .iter()
        .map(|looper| looper.name().to_string())
        .collect();
    let inputs: Vec<SignalId> = runtime
        .loops()
        .iter()
        .map(|looper| looper.endpoints().input)
        .collect();

    let period = Duration::from_millis(args.period_ms);
    let queue = UpdateQueue::bounded((inputs.len() * 8).max(16));
    let running = Arc::new(AtomicBool::new(true));
    let producer = spawn_producer(queue.sender(), inputs, period, args.seed, running.clone());

    for name in &names {
        runtime.set_recording(name, true)?;
    }

    for tick in 0..args.ticks {
        if tick == args.record_for {
            for name in &names {
                runtime.set_recording(name, false)?;
            }
            tracing::info!(tick, "recording disabled");
        }
        runtime.drain(&queue);
        runtime.tick()?;
        thread::sleep(period);
    }

    running.store(false, Ordering::Relaxed);
    if producer.join().is_err() {
        tracing::warn!("input producer panicked");
    }

    for looper in runtime.loops() {
        tracing::info!(
            name = looper.name(),
            state = ?looper.state(),
            cycles = looper.cycles(),
            "loop finished"
        );
    }
    for (param, value) in runtime.host().values() {
        tracing::info!(param, value, "final parameter value");
    }

    runtime.shutdown();
    Ok(())
}

/// Feeds every loop input with a uniform random value once per period.
fn spawn_producer(
    sender: UpdateSender,
    inputs: Vec<SignalId>,
    period: Duration,
    seed: Option<u64>,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        while running.load(Ordering::Relaxed) {
            for input in &inputs {
                sender.send(*input, rng.gen::<f32>());
            }
            thread::sleep(period);
        }
    })
}

fn print_signals(config: Option<&Path>) -> maplooper_core::Result<()> {
    let session = load_session(config)?;
    let runtime = Runtime::from_session(&session, NullHost)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&runtime.registry().snapshot())?
    );
    Ok(())
}

fn load_session(path: Option<&Path>) -> maplooper_core::Result<SessionConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading session");
            SessionConfig::from_path(path)
        }
        None => Ok(SessionConfig::demo()),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Live looping for control signals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record random input into every loop, then play it back.
    Run(RunArgs),
    /// Print the signal registry of a session as JSON.
    Signals {
        /// Session file; the built-in demo session is used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the built-in demo session as JSON.
    DemoConfig,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Session file; the built-in demo session is used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Number of ticks to run.
    #[arg(long, default_value_t = 480)]
    ticks: u64,
    /// Control period in milliseconds.
    #[arg(long, default_value_t = 10)]
    period_ms: u64,
    /// Ticks after which recording is switched off.
    #[arg(long, default_value_t = 96)]
    record_for: u64,
    /// Seed for the random input producer.
    #[arg(long)]
    seed: Option<u64>,
}
