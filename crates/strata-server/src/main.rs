//! The strata server binary.
//!
//! The transport runs on a multi-thread tokio runtime; the simulation runs
//! on its own `sim` thread and exchanges messages with the transport through
//! channels only.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use strata_config::{CliArgs, Config};
use strata_net::{TcpTransport, TransportConfig};
use strata_server::{ServerError, run_simulation};
use strata_sim::{Simulation, validator_from_config};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Grace period for connections to flush after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server stopped");
            eprintln!("strata-server: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<(), ServerError> {
    let config_dir = args.config.clone().unwrap_or_else(Config::default_dir);
    let mut config = Config::load_or_create(&config_dir)?;
    config.apply_cli_overrides(args);
    config.validate()?;

    if let Err(e) = strata_log::init_logging(config.debug.log_dir.as_deref(), Some(&config)) {
        eprintln!("strata-server: logging unavailable: {e}");
    }
    info!(
        config_dir = %config_dir.display(),
        tick_rate = config.simulation.tick_rate,
        snapshot_rate = config.simulation.snapshot_rate,
        "Starting strata server"
    );

    let mut sim = Simulation::new(&config, validator_from_config(&config.auth));

    let (transport, mut events) = TcpTransport::new(TransportConfig::from_config(&config.server)?);
    let transport = Arc::new(transport);
    let mut sink = transport.sink();

    let stop = Arc::new(AtomicBool::new(false));
    let sim_done = Arc::new(Notify::new());
    let sim_thread = {
        let stop = Arc::clone(&stop);
        let sim_done = Arc::clone(&sim_done);
        let sim_config = config.simulation.clone();
        std::thread::Builder::new()
            .name("sim".into())
            .spawn(move || {
                let result = run_simulation(&mut sim, &sim_config, &mut events, &mut sink, &stop);
                sim_done.notify_one();
                result.map(|_| sim)
            })?
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("net")
        .build()?;

    let transport_result = runtime.block_on(async {
        let mut net = tokio::spawn({
            let transport = Arc::clone(&transport);
            async move { transport.run().await }
        });

        let result = tokio::select! {
            joined = &mut net => match joined {
                Ok(result) => result,
                Err(e) => {
                    warn!(error = %e, "Transport task ended abnormally");
                    Ok(())
                }
            },
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Ctrl-C received, shutting down"),
                    Err(e) => warn!(error = %e, "Signal handler failed, shutting down"),
                }
                Ok(())
            }
            _ = sim_done.notified() => Ok(()),
        };

        transport.shutdown();
        if !net.is_finished() && tokio::time::timeout(SHUTDOWN_GRACE, &mut net).await.is_err() {
            warn!("Transport did not stop in time");
            net.abort();
        }
        result
    });

    stop.store(true, Ordering::Relaxed);
    let sim = match sim_thread.join() {
        Ok(Ok(sim)) => sim,
        Ok(Err(e)) => {
            error!(error = %e, "Fatal simulation fault");
            return Err(e.into());
        }
        Err(_) => return Err(ServerError::SimThreadPanicked),
    };
    transport_result?;

    info!(tick = sim.tick(), "Server stopped cleanly");
    Ok(())
}
