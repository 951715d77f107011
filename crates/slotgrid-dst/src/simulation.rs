//! Simulation harness
//!
//! Builds a seeded environment (clock, RNG, I/O context) and runs one test
//! body on a single-threaded tokio runtime.

use crate::clock::SimClock;
use crate::rng::{seed_from_env_or_random, DeterministicRng};
use crate::time::SimTime;
use slotgrid_core::io::{IoContext, RngProvider, TimeProvider};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Seed for every random choice in the run
    pub seed: u64,
    /// Simulated start time (Unix ms)
    pub start_time_ms: u64,
}

impl SimConfig {
    /// Create a configuration with an explicit seed
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            start_time_ms: SimClock::default().now_ms(),
        }
    }

    /// Seed from `DST_SEED`, or pick a random seed
    pub fn from_env_or_random() -> Self {
        let seed = seed_from_env_or_random();
        tracing::info!(seed, "DST seed (set DST_SEED={} to replay)", seed);
        Self::new(seed)
    }

    /// Start the simulated clock at `ms`
    pub fn with_start_time_ms(mut self, ms: u64) -> Self {
        self.start_time_ms = ms;
        self
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Everything a simulated test body needs
#[derive(Debug, Clone)]
pub struct SimEnvironment {
    /// Shared simulated clock
    pub clock: Arc<SimClock>,
    /// Seeded generator
    pub rng: Arc<DeterministicRng>,
    /// Time and RNG behind the production traits
    pub io: IoContext,
}

impl SimEnvironment {
    fn new(config: &SimConfig) -> Self {
        let clock = Arc::new(SimClock::from_millis(config.start_time_ms));
        let rng = Arc::new(DeterministicRng::new(config.seed));
        let io = IoContext::new(
            Arc::new(SimTime::new(clock.clone())) as Arc<dyn TimeProvider>,
            rng.clone() as Arc<dyn RngProvider>,
        );
        Self { clock, rng, io }
    }

    /// Time provider to hand to registry code
    pub fn time(&self) -> Arc<dyn TimeProvider> {
        self.io.time.clone()
    }

    /// Current simulated time
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Advance simulated time
    pub fn advance_time_ms(&self, ms: u64) {
        self.clock.advance_ms(ms);
    }

    /// Independent generator derived from the run's seed
    pub fn fork_rng(&self) -> DeterministicRng {
        self.rng.fork()
    }
}

/// Simulation failure
#[derive(Error, Debug)]
pub enum SimulationError {
    /// The test body returned an error
    #[error("test failed (seed {seed}): {reason}")]
    TestFailed { seed: u64, reason: String },

    /// The runtime could not be built
    #[error("runtime error: {reason}")]
    Runtime { reason: String },
}

/// One seeded simulation run
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
}

impl Simulation {
    /// Create a simulation from a configuration
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    /// Build the environment and run `test` to completion
    ///
    /// # Errors
    /// Returns `TestFailed` carrying the seed if the body fails.
    pub fn run<F, Fut, T, E>(self, test: F) -> Result<T, SimulationError>
    where
        F: FnOnce(SimEnvironment) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let seed = self.config.seed;
        let env = SimEnvironment::new(&self.config);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SimulationError::Runtime {
                reason: e.to_string(),
            })?;

        runtime
            .block_on(test(env))
            .map_err(|e| SimulationError::TestFailed {
                seed,
                reason: e.to_string(),
            })
    }
}
