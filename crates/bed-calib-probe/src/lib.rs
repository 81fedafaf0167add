//! Probe searches for printer bed reference targets.
//!
//! A [`Prober`] drives a [`Motion`] implementation with a single binary
//! proximity sensor to find the trigger height and the center of one target:
//!
//! - [`Prober::find_point_z`]: fast and slow Z approach,
//! - [`Prober::find_point_xy`]: coarse raster and plane bisection,
//! - [`Prober::improve_star`], [`Prober::improve_cross`]: center refinement,
//! - [`Prober::improve_zigzag`]: refinement of targets at the front travel limit,
//! - [`Prober::scan_point`]: diagnostic edge scan.
//!
//! [`SimulatedBed`] is a deterministic motion model used by the tests and the
//! command-line dry run.

mod error;
mod find;
mod motion;
mod params;
mod prober;
mod refine;
mod scan;
pub mod sim;

pub use error::{ProbeError, SearchPhase};
pub use motion::Motion;
pub use params::SearchParams;
pub use prober::Prober;
pub use refine::{PointStatus, RefineStrategy};
pub use scan::{EdgeSide, ScanEdge};
pub use sim::{BedPlane, SimBedConfig, SimTarget, SimulatedBed};
