use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use carbonzipper::config::Config;

/// Fan-out proxy that merges glob and render queries across a cluster of
/// metric storage backends.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the JSON config file
    #[arg(short = 'c', long = "config")]
    config: PathBuf,

    /// Listen port (overrides the config file)
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Worker threads (overrides the config file)
    #[arg(long)]
    maxprocs: Option<usize>,

    /// Debug verbosity: 0 = info, 1 = debug, 2+ = trace
    #[arg(short = 'd', long = "debug", default_value_t = 0)]
    debug: u8,

    /// Also mirror log output to stdout
    #[arg(long)]
    stdout: bool,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.debug, args.stdout);

    let mut config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "startup error");
            process::exit(1);
        }
    };

    // command line overrides the config file
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(maxprocs) = args.maxprocs {
        config.max_procs = maxprocs;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.max_procs.max(1))
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "failed to build runtime");
            process::exit(1);
        }
    };

    if let Err(error) = runtime.block_on(carbonzipper::run(config)) {
        tracing::error!(%error, "runtime error");
        process::exit(1);
    }
}

fn init_tracing(debug: u8, mirror_stdout: bool) {
    let default_level = match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    if mirror_stdout {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry.init();
    }
}
