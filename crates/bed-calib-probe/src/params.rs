use serde::{Deserialize, Serialize};

/// Geometry of the probe searches, in mm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Half extent of the coarse XY raster in X.
    pub raster_radius_x: f32,
    /// Half extent of the coarse XY raster in Y.
    pub raster_radius_y: f32,
    /// Nominal distance between raster lines.
    pub raster_step: f32,
    /// Z drop over one raster sweep.
    pub raster_z_drop: f32,
    /// The raster gives up once Z falls to this height.
    pub raster_z_floor: f32,
    /// Plane search attempts after the first raster trigger.
    pub plane_attempts: usize,
    /// Z drop between plane search attempts.
    pub plane_retry_drop: f32,
    pub cross_radius: f32,
    pub star_radius: f32,
    pub zigzag_radius: f32,
    /// Y step of the zig-zag chord scan and of the diagnostic scan.
    pub fine_step_y: f32,
    /// Z retract between the fast and the slow Z approach.
    pub z_retract: f32,
    /// Lowest Z of the Z search.
    pub z_floor: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            raster_radius_x: 8.0,
            raster_radius_y: 6.0,
            raster_step: 1.0,
            raster_z_drop: 0.5,
            raster_z_floor: -10.0,
            plane_attempts: 3,
            plane_retry_drop: 0.02,
            cross_radius: 8.0,
            star_radius: 8.0,
            zigzag_radius: 4.0,
            fine_step_y: 0.1,
            z_retract: 2.0,
            z_floor: -10.0,
        }
    }
}
