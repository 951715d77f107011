//! Slotgrid DST - Deterministic Simulation Testing
//!
//! Simulated time and seeded randomness for exercising the registry without
//! wall-clock sleeps.
//!
//! # Example
//!
//! ```rust,ignore
//! use slotgrid_dst::{SimConfig, Simulation};
//!
//! #[test]
//! fn test_reaper_timeout() {
//!     let config = SimConfig::from_env_or_random();
//!     Simulation::new(config)
//!         .run(|env| async move {
//!             // Build a GridModel on env.time(), then env.advance_time_ms(..)
//!             Ok::<_, slotgrid_registry::RegistryError>(())
//!         })
//!         .unwrap();
//! }
//! ```
//!
//! Every run logs its seed; set `DST_SEED` to replay it.

pub mod clock;
pub mod rng;
pub mod simulation;
pub mod time;

pub use clock::SimClock;
pub use rng::DeterministicRng;
pub use simulation::{SimConfig, SimEnvironment, Simulation, SimulationError};
pub use time::SimTime;
