use nalgebra::Point3;

/// Motion system driven by the searches.
///
/// Every move blocks until the stage arrives or, with the probe check
/// enabled, until the probe triggers. Coordinates are machine coordinates.
pub trait Motion {
    /// Move in a straight line to `target` at `feedrate` (mm/s).
    fn go_to(&mut self, target: Point3<f32>, feedrate: f32);

    /// Achieved position. Differs from the last target after a trigger.
    fn position(&self) -> Point3<f32>;

    /// Enable the hard-limit switches. Returns the previous state.
    fn enable_endstops(&mut self, on: bool) -> bool;

    /// Enable the probe trigger check. Returns the previous state.
    fn enable_probe(&mut self, on: bool) -> bool;

    /// Whether the probe triggered a stop since the last call. Reading clears it.
    fn probe_triggered(&mut self) -> bool;
}

impl<M: Motion + ?Sized> Motion for &mut M {
    fn go_to(&mut self, target: Point3<f32>, feedrate: f32) {
        (**self).go_to(target, feedrate)
    }

    fn position(&self) -> Point3<f32> {
        (**self).position()
    }

    fn enable_endstops(&mut self, on: bool) -> bool {
        (**self).enable_endstops(on)
    }

    fn enable_probe(&mut self, on: bool) -> bool {
        (**self).enable_probe(on)
    }

    fn probe_triggered(&mut self) -> bool {
        (**self).probe_triggered()
    }
}
