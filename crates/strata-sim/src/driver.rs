//! Fixed-timestep accumulator for the simulation loop.
//!
//! Wall-clock time is fed in with [`FixedTimestep::advance`], which returns
//! how many simulation steps are due. Catch-up is bounded: at most
//! `max_steps` steps run per advance, and accumulated time beyond
//! `max_accumulated` is dropped instead of replayed.

use std::time::Duration;

use strata_config::SimulationConfig;
use tracing::warn;

/// Tick scheduling state.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    interval: Duration,
    max_steps: u32,
    max_accumulated: Duration,
    accumulator: Duration,
    total_steps: u64,
    dropped: Duration,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32, max_steps: u32, max_accumulated: Duration) -> Self {
        let interval = Duration::from_secs(1) / tick_rate.max(1);
        Self {
            interval,
            max_steps: max_steps.max(1),
            max_accumulated: max_accumulated.max(interval),
            accumulator: Duration::ZERO,
            total_steps: 0,
            dropped: Duration::ZERO,
        }
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        let max_accumulated =
            Duration::try_from_secs_f64(config.max_accumulated_secs).unwrap_or(Duration::ZERO);
        Self::new(config.tick_rate, config.max_steps_per_frame, max_accumulated)
    }

    /// Length of one tick.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tick length in seconds, as used by the subsystems.
    pub fn dt(&self) -> f32 {
        self.interval.as_secs_f32()
    }

    /// Add elapsed wall-clock time and return the number of steps to run.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulator += elapsed;
        if self.accumulator > self.max_accumulated {
            let excess = self.accumulator - self.max_accumulated;
            warn!(
                excess_ms = excess.as_secs_f64() * 1000.0,
                "Simulation fell behind, dropping accumulated time"
            );
            self.dropped += excess;
            self.accumulator = self.max_accumulated;
        }

        let mut steps = 0;
        while self.accumulator >= self.interval && steps < self.max_steps {
            self.accumulator -= self.interval;
            steps += 1;
        }
        self.total_steps += u64::from(steps);
        steps
    }

    /// Time left before the next step is due.
    pub fn time_until_next_tick(&self) -> Duration {
        self.interval.saturating_sub(self.accumulator)
    }

    /// Steps granted since creation.
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Wall-clock time discarded by the catch-up cap.
    pub fn dropped(&self) -> Duration {
        self.dropped
    }
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}
