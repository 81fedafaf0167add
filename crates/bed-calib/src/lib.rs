//! High-level facade crate for the `bed-calib-*` workspace.
//!
//! This crate provides:
//! - re-exports of the core types, the solver and the probe searches,
//! - the calibration procedures ([`BedCalibrator`]): coarse 4-point
//!   detection, iterative 9-point refinement and the diagnostic scan,
//! - the collaborator traits they drive ([`MeshGrid`], [`Watchdog`],
//!   [`StatusSink`]) and an in-memory [`GridMesh`],
//! - JSON config and report helpers ([`io`]) used by the `bed-calib` binary.
//!
//! ## Quickstart
//!
//! ```
//! use bed_calib::core::{CalibrationResult, MachineLimits, MemoryStore, World2Machine};
//! use bed_calib::probe::{RefineStrategy, SimBedConfig, SimulatedBed};
//! use bed_calib::{BedCalibrator, CalibrationParams, GridMesh, LogStatus, Machine, NoWatchdog};
//!
//! let mut params = CalibrationParams::default();
//! params.solver = bed_calib::solver::SolverParams::unscaled();
//! let mut bed = SimulatedBed::from_config(&SimBedConfig::default(), MachineLimits::default());
//! let mut store = MemoryStore::new();
//! let mut mesh = GridMesh::new();
//! let mut w2m = World2Machine::identity();
//! let mut m = Machine {
//!     motion: &mut bed,
//!     storage: &mut store,
//!     mesh: &mut mesh,
//!     watchdog: &mut NoWatchdog,
//!     status: &mut LogStatus,
//!     w2m: &mut w2m,
//! };
//!
//! let calib = BedCalibrator::new(params);
//! assert_ne!(calib.find_offset_and_skew(&mut m, 0), CalibrationResult::Failed);
//! assert_ne!(
//!     calib.improve_offset_and_skew(&mut m, RefineStrategy::Cross, 0),
//!     CalibrationResult::Failed
//! );
//! ```
//!
//! ## API map
//! - `bed_calib::core`: transform, corrections, reference grids, persisted record.
//! - `bed_calib::solver`: Gauss-Newton skew/offset fit.
//! - `bed_calib::probe`: motion trait, probe searches, simulated bed.

pub use bed_calib_core as core;
pub use bed_calib_probe as probe;
pub use bed_calib_solver as solver;

mod collab;
pub mod io;
mod mesh;
mod orchestrator;
mod params;

pub use collab::{
    LogStatus, MeshGrid, NoWatchdog, Procedure, StatusEvent, StatusSink, Watchdog,
};
pub use mesh::{GridMesh, UPSAMPLED_SIZE};
pub use orchestrator::{
    is_z_jitter_data_valid, reset_calibration, BedCalibrator, CalibrationError, CalibrationRun,
    Machine, PointScan, ScanRun,
};
pub use params::CalibrationParams;

pub use bed_calib_core::CalibrationResult;
pub use bed_calib_probe::RefineStrategy;
