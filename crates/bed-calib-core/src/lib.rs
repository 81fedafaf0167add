//! Core types for printer bed skew calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! know how points are probed or how the correction is fitted; it only holds
//! the data both sides agree on:
//! - [`AffineCorrection`] and its validity gate,
//! - the process-wide world-to-machine transform [`World2Machine`],
//! - the compiled-in reference grids,
//! - the persisted calibration record ([`CalibrationStorage`]).

mod correction;
mod grid;
mod logger;
mod machine;
mod result;
mod storage;
mod transform;

pub use correction::{AffineCorrection, GeometryError, CORRECTION_LIMITS};
pub use grid::{
    mesh_cell, BED_REF_POINTS_4, BED_REF_POINTS_9, BED_ZERO_REF, FIRST_ROW_POINTS, MESH_COLS,
    MESH_ROWS,
};
pub use machine::{Feedrates, MachineLimits};
pub use result::CalibrationResult;
pub use storage::{
    ByteStore, CalibrationStorage, FileStore, MemoryStore, StorageError, ZJitter, RECORD_LEN,
};
pub use transform::{CorrectionMode, World2Machine};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;

pub use nalgebra::{Point2, Point3, Vector2};
