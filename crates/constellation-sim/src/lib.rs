//! Constellation Simulation
//!
//! Discrete-time driver for the LEO relay network. Every tick recomputes
//! positions, rebuilds the link topology, attaches the ground stations that
//! have pending requests and resolves those requests to end-to-end paths.
//!
//! Per-tick results are written to uniquely named files so that independent
//! worker processes (see [`harness`]) never touch the same file; [`merge`]
//! folds them back into one file per stream afterwards.

use constellation_net::TopologyError;
use ground_stations::StationError;
use orbital_mechanics::OrbitalError;
use std::path::PathBuf;
use thiserror::Error;

pub mod animation;
pub mod config;
pub mod driver;
pub mod harness;
pub mod merge;
pub mod output;
pub mod workload;

pub use animation::{AnimationHandle, AnimationMessage, LogRenderer, Renderer, ViewState};
pub use config::SimConfig;
pub use driver::{DriverState, RequestFailure, RunSummary, Simulation, TickReport};
pub use output::{ResultWriter, Stream};
pub use workload::{EmptyWorkload, Request, RequestLog, WorkloadSource};

/// Simulation errors
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Stations(#[from] StationError),

    #[error(transparent)]
    Orbital(#[from] OrbitalError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error("Workload {path:?}, line {line}: {message}")]
    Workload {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{failed} of {total} worker processes failed: {detail}")]
    ProcessFailure {
        failed: usize,
        total: usize,
        detail: String,
    },

    #[error("Animation consumer panicked")]
    AnimationPanicked,

    #[error("Driver is {state:?}, cannot {action}")]
    InvalidState {
        state: DriverState,
        action: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, SimError>;
