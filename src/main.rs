use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;

use best_relay::cli::Cli;
use best_relay::error::{RelayError, SUCCESS};
use best_relay::output::write_ranked;
use best_relay::runtime::build_runtime;
use best_relay::{load_and_run, IcmpProber};

fn init_logging(level: LevelFilter) {
    // Logs go to stderr; stdout is reserved for results.
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Stderr)
        .format_timestamp_millis()
        .try_init();
}

fn run(cli: Cli) -> Result<(), RelayError> {
    let (config, level) = cli.into_config()?;
    init_logging(level);

    log::debug!(
        "best-relay v{} starting with {:?}",
        env!("CARGO_PKG_VERSION"),
        config
    );

    let runtime = build_runtime(config.concurrency)?;
    let prober = Arc::new(IcmpProber::new(config.probe_timeout, config.socket_mode));
    let report = runtime.block_on(load_and_run(&config, prober))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_ranked(&mut out, &report.ranked, &config)
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => SUCCESS,
        Err(e) => {
            eprintln!("best-relay: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}
