//! World-to-machine coordinate transform.
//!
//! [`World2Machine`] is the explicit context object that every motion
//! translation goes through. It is mutated only at the commit points of a
//! calibration run.
//!
//! # Critical region
//!
//! Calibration procedures neutralise the transform with
//! [`World2Machine::reset`] while probing in raw machine coordinates and
//! restore or replace it afterwards. No coordinate translation may happen
//! in between; keep that window as short as possible.

use nalgebra::{Matrix2, Point2, Vector2};

use crate::correction::AffineCorrection;
use crate::storage::{ByteStore, CalibrationStorage};

/// Active correction flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CorrectionMode(u8);

impl CorrectionMode {
    pub const NONE: CorrectionMode = CorrectionMode(0);
    pub const SHIFT: CorrectionMode = CorrectionMode(1);
    pub const SKEW: CorrectionMode = CorrectionMode(2);

    #[inline]
    pub fn contains(self, other: CorrectionMode) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for CorrectionMode {
    type Output = CorrectionMode;

    fn bitor(self, rhs: CorrectionMode) -> CorrectionMode {
        CorrectionMode(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for CorrectionMode {
    fn bitor_assign(&mut self, rhs: CorrectionMode) {
        self.0 |= rhs.0;
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct World2Machine {
    matrix: Matrix2<f32>,
    inverse: Matrix2<f32>,
    shift: Vector2<f32>,
    mode: CorrectionMode,
}

impl Default for World2Machine {
    fn default() -> Self {
        Self::identity()
    }
}

impl World2Machine {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix2::identity(),
            inverse: Matrix2::identity(),
            shift: Vector2::zeros(),
            mode: CorrectionMode::NONE,
        }
    }

    /// Load the persisted correction, falling back to identity.
    ///
    /// A missing record or one failing [`AffineCorrection::validate`] resets
    /// the storage to the unset pattern. Storage errors are logged and treated
    /// like an unset record.
    pub fn initialize<S: ByteStore>(storage: &mut CalibrationStorage<S>) -> Self {
        let loaded = match storage.load_correction() {
            Ok(c) => c,
            Err(e) => {
                log::warn!("failed to read calibration record: {e}");
                None
            }
        };

        let Some(correction) = loaded else {
            log::info!("bed skew calibration not performed, using identity");
            if let Err(e) = storage.reset() {
                log::warn!("failed to reset calibration record: {e}");
            }
            return Self::identity();
        };

        if let Err(e) = correction.validate() {
            log::warn!("stored bed correction rejected: {e}");
            if let Err(e) = storage.reset() {
                log::warn!("failed to reset calibration record: {e}");
            }
            return Self::identity();
        }

        let mut w2m = Self::identity();
        if w2m.update(&correction).is_err() {
            log::warn!("stored bed correction is singular");
            if let Err(e) = storage.reset() {
                log::warn!("failed to reset calibration record: {e}");
            }
            return Self::identity();
        }
        log::debug!("loaded bed correction {correction:?} (mode {:?})", w2m.mode);
        w2m
    }

    /// Install the identity: no shift, no skew.
    pub fn reset(&mut self) {
        *self = Self::identity();
    }

    /// Install a correction. The matrix is inverted only when skew is active.
    pub fn update(&mut self, c: &AffineCorrection) -> Result<(), crate::GeometryError> {
        let matrix = c.matrix();
        let mut mode = CorrectionMode::NONE;
        if c.center != Vector2::zeros() {
            mode |= CorrectionMode::SHIFT;
        }
        let inverse = if matrix != Matrix2::identity() {
            mode |= CorrectionMode::SKEW;
            matrix
                .try_inverse()
                .ok_or(crate::GeometryError::Singular)?
        } else {
            Matrix2::identity()
        };

        self.matrix = matrix;
        self.inverse = inverse;
        self.shift = c.center;
        self.mode = mode;
        Ok(())
    }

    #[inline]
    pub fn mode(&self) -> CorrectionMode {
        self.mode
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.mode.is_none()
    }

    /// The installed correction.
    pub fn correction(&self) -> AffineCorrection {
        AffineCorrection::from_matrix(self.matrix, self.shift)
    }

    /// World to machine: `M·p + shift`.
    #[inline]
    pub fn apply(&self, world: Point2<f32>) -> Point2<f32> {
        let mut v = world.coords;
        if self.mode.contains(CorrectionMode::SKEW) {
            v = self.matrix * v;
        }
        if self.mode.contains(CorrectionMode::SHIFT) {
            v += self.shift;
        }
        Point2::from(v)
    }

    /// Machine to world: `M⁻¹·(p - shift)`.
    #[inline]
    pub fn apply_inverse(&self, machine: Point2<f32>) -> Point2<f32> {
        let mut v = machine.coords;
        if self.mode.contains(CorrectionMode::SHIFT) {
            v -= self.shift;
        }
        if self.mode.contains(CorrectionMode::SKEW) {
            v = self.inverse * v;
        }
        Point2::from(v)
    }
}
