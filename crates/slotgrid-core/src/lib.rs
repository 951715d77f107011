//! Slotgrid Core
//!
//! Core constants, errors, configuration and I/O providers shared by the
//! slotgrid registry and its control-plane binary.
//!
//! # Overview
//!
//! Slotgrid is the registry and admission-control core of a
//! browser-automation grid. This crate carries everything that is not
//! specific to the node registry itself:
//! - Explicit limits with big-endian naming (e.g., `NODE_ID_LENGTH_BYTES_MAX`)
//! - Injectable time and randomness so the registry can run under simulation
//! - Configuration with validated defaults
//! - Tracing subscriber setup

pub mod config;
pub mod constants;
pub mod error;
pub mod io;
pub mod telemetry;

pub use config::{EventBusConfig, ReaperConfig, RegistryConfig, SlotgridConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use io::{IoContext, RngProvider, StdRngProvider, TimeProvider, WallClockTime};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
