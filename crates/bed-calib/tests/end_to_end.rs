use approx::assert_abs_diff_eq;
use bed_calib::core::{
    AffineCorrection, CalibrationStorage, MachineLimits, MemoryStore, Vector2, World2Machine,
    BED_REF_POINTS_4, BED_REF_POINTS_9,
};
use bed_calib::probe::{BedPlane, Motion, SimBedConfig, SimulatedBed};
use bed_calib::solver::SolverParams;
use bed_calib::{
    BedCalibrator, CalibrationParams, CalibrationResult, GridMesh, Machine, Procedure,
    RefineStrategy, StatusEvent, Watchdog, UPSAMPLED_SIZE,
};

#[derive(Default)]
struct CountingWatchdog(usize);

impl Watchdog for CountingWatchdog {
    fn refresh(&mut self) {
        self.0 += 1;
    }
}

struct Rig {
    bed: SimulatedBed,
    store: MemoryStore,
    mesh: GridMesh,
    watchdog: CountingWatchdog,
    events: Vec<StatusEvent>,
    w2m: World2Machine,
}

impl Rig {
    fn new(cfg: &SimBedConfig) -> Self {
        Self {
            bed: SimulatedBed::from_config(cfg, MachineLimits::default()),
            store: MemoryStore::new(),
            mesh: GridMesh::new(),
            watchdog: CountingWatchdog::default(),
            events: Vec::new(),
            w2m: World2Machine::identity(),
        }
    }

    /// Persist and install a correction, as a previous run would have.
    fn preset(&mut self, c: &AffineCorrection) {
        CalibrationStorage::new(&mut self.store)
            .store_correction(c)
            .expect("store");
        self.w2m = World2Machine::initialize(&mut CalibrationStorage::new(&mut self.store));
        assert!(!self.w2m.is_identity());
    }

    fn machine(&mut self) -> Machine<'_> {
        Machine {
            motion: &mut self.bed,
            storage: &mut self.store,
            mesh: &mut self.mesh,
            watchdog: &mut self.watchdog,
            status: &mut self.events,
            w2m: &mut self.w2m,
        }
    }

    fn stored(&mut self) -> Option<AffineCorrection> {
        CalibrationStorage::new(&mut self.store)
            .load_correction()
            .expect("load")
    }
}

fn calibrator() -> BedCalibrator {
    BedCalibrator::new(CalibrationParams {
        solver: SolverParams::unscaled(),
        ..CalibrationParams::default()
    })
}

fn rotated(deg: f32, shift: (f32, f32)) -> AffineCorrection {
    let (s, c) = deg.to_radians().sin_cos();
    AffineCorrection::new(
        Vector2::new(c, s),
        Vector2::new(-s, c),
        Vector2::new(shift.0, shift.1),
    )
}

fn shifted(x: f32, y: f32) -> AffineCorrection {
    rotated(0.0, (x, y))
}

#[test]
fn coarse_recovers_rotated_and_shifted_bed() {
    let geometry = rotated(0.2, (0.5, 0.3));
    let cfg = SimBedConfig {
        geometry,
        ..SimBedConfig::default()
    };
    let mut rig = Rig::new(&cfg);

    let run = calibrator().coarse(&mut rig.machine(), 0);
    assert_eq!(run.procedure, Procedure::Coarse);
    assert!(run.error.is_none(), "{:?}", run.error);
    assert!(!run.result.is_failed());
    assert_eq!(run.measured.len(), BED_REF_POINTS_4.len());

    for p in BED_REF_POINTS_4 {
        let got = rig.w2m.apply(p);
        let want = geometry.apply(p);
        assert_abs_diff_eq!(got.x, want.x, epsilon = 0.05);
        assert_abs_diff_eq!(got.y, want.y, epsilon = 0.05);
    }
    assert_eq!(rig.stored(), Some(rig.w2m.correction()));
    assert!(rig.bed.endstops_enabled());

    // The head did not move after the commit; its world position is reported.
    let head = run.head_world.expect("head position");
    let expected = rig.w2m.apply_inverse(rig.bed.position().xy());
    assert_abs_diff_eq!(head.x, expected.x, epsilon = 1e-5);
    assert_abs_diff_eq!(head.y, expected.y, epsilon = 1e-5);

    let found = rig
        .events
        .iter()
        .filter(|e| matches!(e, StatusEvent::PointFound { .. }))
        .count();
    assert_eq!(found, 4);
    assert!(matches!(
        rig.events.last(),
        Some(StatusEvent::Finished {
            procedure: Procedure::Coarse,
            ..
        })
    ));
}

#[test]
fn refine_fits_shift_and_samples_tilted_bed() {
    let cfg = SimBedConfig {
        geometry: shifted(0.3, 0.2),
        surface: BedPlane {
            z0: 0.0,
            slope_x: 0.001,
            slope_y: 0.002,
        },
        ..SimBedConfig::default()
    };
    let mut rig = Rig::new(&cfg);
    rig.preset(&shifted(0.25, 0.15));

    let run = calibrator().refine(&mut rig.machine(), RefineStrategy::Cross, 0);
    assert!(run.error.is_none(), "{:?}", run.error);
    assert_eq!(run.result, CalibrationResult::Perfect);
    assert!(run.far_points.is_empty());
    assert_eq!(run.measured.len(), BED_REF_POINTS_9.len());

    let c = rig.w2m.correction();
    assert_abs_diff_eq!(c.center.x, 0.3, epsilon = 0.03);
    assert_abs_diff_eq!(c.center.y, 0.2, epsilon = 0.03);
    assert_eq!(rig.stored(), Some(c));

    let jitter = run.z_jitter.expect("jitter");
    assert!((9..=11).contains(&jitter[0]), "{jitter:?}");
    assert!((19..=21).contains(&jitter[1]), "{jitter:?}");
    assert!((19..=21).contains(&jitter[2]), "{jitter:?}");
    assert!(bed_calib::is_z_jitter_data_valid(&mut rig.store));

    assert_eq!(rig.mesh.size(), UPSAMPLED_SIZE);
    assert!(rig.mesh.is_active());

    let park = MachineLimits::default().park_xy();
    let pos = rig.bed.position();
    assert_abs_diff_eq!(pos.x, park.x, epsilon = 1e-4);
    assert_abs_diff_eq!(pos.y, park.y, epsilon = 1e-4);
}

#[test]
fn refine_star_strategy_converges() {
    let cfg = SimBedConfig {
        geometry: shifted(-0.2, 0.4),
        ..SimBedConfig::default()
    };
    let mut rig = Rig::new(&cfg);
    rig.preset(&shifted(-0.4, 0.6));

    let result = calibrator().improve_offset_and_skew(&mut rig.machine(), RefineStrategy::Star, 0);
    assert_eq!(result, CalibrationResult::Perfect);
    let c = rig.w2m.correction();
    assert_abs_diff_eq!(c.center.x, -0.2, epsilon = 0.05);
    assert_abs_diff_eq!(c.center.y, 0.4, epsilon = 0.05);
}

#[test]
fn front_row_beyond_travel_limit_is_reported_far() {
    // Every first-row target sits below the Y travel limit.
    let geometry = shifted(0.0, -2.45);
    let cfg = SimBedConfig {
        geometry,
        ..SimBedConfig::default()
    };
    let mut rig = Rig::new(&cfg);
    rig.preset(&geometry);

    let run = calibrator().refine(&mut rig.machine(), RefineStrategy::Cross, 0);
    assert!(run.error.is_none(), "{:?}", run.error);
    assert_eq!(run.far_points, vec![0, 1, 2]);
    // The front right point is checked last.
    assert_eq!(run.result, CalibrationResult::FrontRightTooFar);
    assert!(rig.stored().is_some());
}

#[test]
fn only_front_left_beyond_travel_limit() {
    // Rotated so the front row climbs from y = -4.45 on the left to -2.56 on
    // the right; only the front-left target is below the Y limit of -4.
    let geometry = rotated(0.534, (0.0, -2.562));
    let cfg = SimBedConfig {
        geometry,
        ..SimBedConfig::default()
    };
    let mut rig = Rig::new(&cfg);
    rig.preset(&geometry);

    let run = calibrator().refine(&mut rig.machine(), RefineStrategy::Cross, 0);
    assert!(run.error.is_none(), "{:?}", run.error);
    assert_eq!(run.far_points, vec![0]);
    assert_eq!(run.result, CalibrationResult::FrontLeftTooFar);
    assert!(run.head_world.is_some());
}

#[test]
fn missing_target_rolls_back_to_identity() {
    let cfg = SimBedConfig {
        bare_bed_contact: false,
        missing_targets: (0..9).collect(),
        ..SimBedConfig::default()
    };
    let mut rig = Rig::new(&cfg);
    rig.preset(&shifted(0.5, 0.5));

    let run = calibrator().coarse(&mut rig.machine(), 0);
    assert_eq!(run.result, CalibrationResult::Failed);
    assert!(run.error.is_some());
    assert!(run.fit.is_none());
    assert!(run.head_world.is_none());
    assert!(rig.w2m.is_identity());
    assert!(rig.store.as_bytes().iter().all(|&b| b == 0xFF));

    let params = CalibrationParams::default();
    assert_abs_diff_eq!(rig.bed.position().z, params.search_height, epsilon = 1e-4);
    assert!(rig.bed.endstops_enabled());
    assert!(!rig.bed.probe_enabled());
    assert!(matches!(
        rig.events.last(),
        Some(StatusEvent::Finished {
            result: CalibrationResult::Failed,
            ..
        })
    ));
}

#[test]
fn excessive_z_span_fails_and_erases_record() {
    let mut height_offsets = vec![0.0; 9];
    height_offsets[4] = 3.5;
    let cfg = SimBedConfig {
        height_offsets,
        ..SimBedConfig::default()
    };
    let mut rig = Rig::new(&cfg);

    let run = calibrator().refine(&mut rig.machine(), RefineStrategy::Cross, 0);
    assert_eq!(run.result, CalibrationResult::Failed);
    let error = run.error.expect("error");
    assert!(error.contains("span"), "{error}");
    assert!(run.z_jitter.is_none());
    assert_eq!(rig.stored(), None);
    assert!(!bed_calib::is_z_jitter_data_valid(&mut rig.store));
    assert!(rig.w2m.is_identity());
}

#[test]
fn scan_restores_transform_and_keeps_record() {
    let geometry = shifted(0.2, 0.1);
    let cfg = SimBedConfig {
        geometry,
        ..SimBedConfig::default()
    };
    let mut rig = Rig::new(&cfg);
    rig.preset(&geometry);
    let before = rig.store.as_bytes().to_vec();
    let w2m = rig.w2m;

    let run = calibrator().scan(&mut rig.machine(), 0);
    assert!(run.complete);
    assert_eq!(run.points.len(), BED_REF_POINTS_9.len());
    assert!(run.points.iter().all(|p| !p.edges.is_empty()));

    assert_eq!(rig.w2m, w2m);
    assert_eq!(rig.store.as_bytes(), &before[..]);
    assert!(rig
        .events
        .iter()
        .any(|e| matches!(e, StatusEvent::Edge { .. })));
    assert_eq!(
        rig.events.last(),
        Some(&StatusEvent::ScanFinished { complete: true })
    );
}

#[test]
fn scan_skips_unreachable_points() {
    let cfg = SimBedConfig {
        bare_bed_contact: false,
        missing_targets: vec![7],
        ..SimBedConfig::default()
    };
    let mut rig = Rig::new(&cfg);

    let calib = calibrator();
    assert!(!calib.scan_induction_points(&mut rig.machine(), 0));
}

#[test]
fn coarse_then_refine_on_ideal_bed() {
    let mut rig = Rig::new(&SimBedConfig::default());
    let calib = calibrator();

    let coarse = calib.find_offset_and_skew(&mut rig.machine(), 0);
    assert_eq!(coarse, CalibrationResult::Perfect);
    let after_coarse = rig.watchdog.0;
    assert!(after_coarse >= BED_REF_POINTS_4.len());

    let run = calib.refine(&mut rig.machine(), RefineStrategy::Cross, 0);
    assert_eq!(run.result, CalibrationResult::Perfect);
    assert!(rig.watchdog.0 >= after_coarse + 2 * BED_REF_POINTS_9.len());

    let jitter = run.z_jitter.expect("jitter");
    assert!(jitter.iter().all(|j| j.abs() <= 1), "{jitter:?}");
    let c = rig.w2m.correction();
    assert_abs_diff_eq!(c.center.x, 0.0, epsilon = 0.03);
    assert_abs_diff_eq!(c.center.y, 0.0, epsilon = 0.03);
}

#[test]
fn reset_calibration_clears_previous_run() {
    let mut rig = Rig::new(&SimBedConfig::default());
    rig.preset(&shifted(1.0, -1.0));
    bed_calib::reset_calibration(&mut rig.store).expect("reset");
    assert_eq!(rig.stored(), None);
    let w2m = World2Machine::initialize(&mut CalibrationStorage::new(&mut rig.store));
    assert!(w2m.is_identity());
}
