//! The simulation thread.
//!
//! [`run_simulation`] owns the [`Simulation`] for the lifetime of the
//! server: it drains transport events between ticks, feeds wall-clock time
//! into a [`FixedTimestep`] and runs the steps that come due. Nothing in
//! here blocks on the network.
//!
//! [`load_world`] and [`save_world`] bind an external persistence service
//! through [`WorldPersistence`] on startup and shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use strata_config::SimulationConfig;
use strata_protocol::{InboundEvent, MessageSink};
use strata_sim::{FixedTimestep, SimError, Simulation, WorldPersistence};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::error::ServerError;

/// Longest sleep between polls of the stop flag and the event queue.
const MAX_IDLE: Duration = Duration::from_millis(5);

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub steps: u64,
    pub events: u64,
    pub faults: u64,
    pub dropped: Duration,
}

/// Run until `stop` is set or the transport closes the event channel.
///
/// Returns the first fatal simulation error.
pub fn run_simulation(
    sim: &mut Simulation,
    config: &SimulationConfig,
    events: &mut mpsc::Receiver<InboundEvent>,
    sink: &mut dyn MessageSink,
    stop: &AtomicBool,
) -> Result<LoopSummary, SimError> {
    let mut timestep = FixedTimestep::from_config(config);
    let mut summary = LoopSummary::default();
    let mut last = Instant::now();
    info!(tick_rate = config.tick_rate, tick = sim.tick(), "Simulation loop started");

    'run: while !stop.load(Ordering::Relaxed) {
        loop {
            match events.try_recv() {
                Ok(event) => {
                    summary.events += 1;
                    sim.handle_event(event, sink);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("Event channel closed");
                    break 'run;
                }
            }
        }

        let now = Instant::now();
        let steps = timestep.advance(now - last);
        last = now;
        for _ in 0..steps {
            let report = sim.step(sink)?;
            summary.faults += report.faults.len() as u64;
            if report.snapshot_sent {
                debug!(tick = report.tick, "Snapshot broadcast");
            }
        }

        std::thread::sleep(timestep.time_until_next_tick().min(MAX_IDLE));
    }

    summary.steps = timestep.total_steps();
    summary.dropped = timestep.dropped();
    if summary.faults > 0 {
        warn!(faults = summary.faults, "Subsystem faults were isolated during the run");
    }
    info!(steps = summary.steps, tick = sim.tick(), "Simulation loop stopped");
    Ok(summary)
}

/// Restore the stored world. Returns `false` when nothing was saved yet.
pub fn load_world(
    sim: &mut Simulation,
    backend: &mut dyn WorldPersistence,
) -> Result<bool, ServerError> {
    let Some(save) = backend.load()? else {
        info!("No world save found, starting fresh");
        return Ok(false);
    };
    info!(
        tick = save.tick,
        entities = save.entities.len(),
        chunks = save.chunks.len(),
        "Restoring world"
    );
    sim.restore(save)?;
    Ok(true)
}

/// Store the current world.
pub fn save_world(sim: &Simulation, backend: &mut dyn WorldPersistence) -> Result<(), ServerError> {
    let save = sim.export_save();
    info!(tick = save.tick, entities = save.entities.len(), "Saving world");
    backend.store(&save)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::sync::Arc;
    use strata_config::Config;
    use strata_protocol::{Handshake, Message, PROTOCOL_VERSION, PeerId, RecordingSink};
    use strata_sim::{InMemoryPersistence, OpenValidator};

    fn sim() -> Simulation {
        Simulation::new(&Config::default(), Box::new(OpenValidator))
    }

    fn handshake() -> InboundEvent {
        InboundEvent::Message(
            PeerId(1),
            Message::Handshake(Handshake {
                session_token: "t".into(),
                client_id: "alice".into(),
                protocol_version: PROTOCOL_VERSION,
            }),
        )
    }

    #[test]
    fn test_loop_handles_events_and_steps_until_stopped() {
        let mut sim = sim();
        let (tx, mut rx) = mpsc::channel(16);
        tx.try_send(InboundEvent::Connected(PeerId(1))).unwrap();
        tx.try_send(handshake()).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let stopper = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(200));
                stop.store(true, Ordering::Relaxed);
            })
        };

        let mut sink = RecordingSink::new();
        let summary =
            run_simulation(&mut sim, &SimulationConfig::default(), &mut rx, &mut sink, &stop)
                .unwrap();
        stopper.join().unwrap();

        assert_eq!(summary.events, 2);
        assert!(summary.steps > 0);
        assert_eq!(sim.tick(), summary.steps);
        assert!(
            sink.to_peer(PeerId(1))
                .any(|m| matches!(m, Message::HandshakeResponse(r) if r.success))
        );
        drop(tx);
    }

    #[test]
    fn test_loop_exits_when_transport_closes() {
        let mut sim = sim();
        let (tx, mut rx) = mpsc::channel::<InboundEvent>(4);
        drop(tx);
        let stop = AtomicBool::new(false);
        let summary = run_simulation(
            &mut sim,
            &SimulationConfig::default(),
            &mut rx,
            &mut RecordingSink::new(),
            &stop,
        )
        .unwrap();
        assert_eq!(summary.events, 0);
    }

    #[test]
    fn test_world_survives_save_and_load() {
        let mut backend = InMemoryPersistence::new();
        let mut first = sim();
        assert!(!load_world(&mut first, &mut backend).unwrap());
        let npc = first.spawn_npc(Vec3::new(3.0, 0.0, 3.0), 0.0);
        save_world(&first, &mut backend).unwrap();

        let mut second = sim();
        assert!(load_world(&mut second, &mut backend).unwrap());
        assert!(second.registry().get(npc).is_some());
    }
}
