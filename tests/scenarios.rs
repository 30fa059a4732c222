//! End-to-end scenarios (S1-S6) and the numbered boundary invariants,
//! driven against the public `AhrsEngine` API only.

use lynch_ahrs::{AhrsEngine, ImuConfig, ModeContext, RuntimeConfig, SensorSource};
use nalgebra::Vector3;

#[derive(Clone, Copy)]
struct Scripted {
    gyro_rad_s: Vector3<f32>,
    accel_raw: Vector3<f32>,
    mag_raw: Vector3<f32>,
    have_compass: bool,
    have_gps: bool,
    gps_fix: bool,
    gps_num_sat: u8,
    gps_ground_speed_cm_s: u32,
    gps_course_rad: f32,
    armed: bool,
    now_us: u64,
    dt: f32,
}

impl Default for Scripted {
    fn default() -> Self {
        Scripted {
            gyro_rad_s: Vector3::zeros(),
            accel_raw: Vector3::new(0.0, 0.0, 1.0),
            mag_raw: Vector3::zeros(),
            have_compass: false,
            have_gps: false,
            gps_fix: false,
            gps_num_sat: 0,
            gps_ground_speed_cm_s: 0,
            gps_course_rad: 0.0,
            armed: true,
            now_us: 0,
            dt: 0.001,
        }
    }
}

impl SensorSource for Scripted {
    fn gyro_rad_s(&self) -> Vector3<f32> {
        self.gyro_rad_s
    }
    fn accel_raw(&self) -> Vector3<f32> {
        self.accel_raw
    }
    fn acc_1g_reciprocal(&self) -> f32 {
        1.0
    }
    fn acc_present(&self) -> bool {
        true
    }
    fn mag_raw(&self) -> Vector3<f32> {
        self.mag_raw
    }
    fn have_compass(&self) -> bool {
        self.have_compass
    }
    fn compass_healthy(&self) -> bool {
        self.have_compass
    }
    fn gps_rescue_disable_mag(&self) -> bool {
        false
    }
    fn have_gps(&self) -> bool {
        self.have_gps
    }
    fn gps_fix(&self) -> bool {
        self.gps_fix
    }
    fn gps_num_satellites(&self) -> u8 {
        self.gps_num_sat
    }
    fn gps_ground_speed_cm_s(&self) -> u32 {
        self.gps_ground_speed_cm_s
    }
    fn gps_course_over_ground_rad(&self) -> f32 {
        self.gps_course_rad
    }
    fn armed(&self) -> bool {
        self.armed
    }
    fn now_us(&self) -> u64 {
        self.now_us
    }
    fn dt_seconds(&self) -> f32 {
        self.dt
    }
    fn mode(&self) -> ModeContext {
        ModeContext::default()
    }
}

fn new_engine() -> AhrsEngine {
    AhrsEngine::new(RuntimeConfig::from_config(&ImuConfig::default()).unwrap())
}

/// S1 - Stationary upright convergence.
#[test]
fn stationary_upright_convergence() {
    let mut engine = new_engine();
    let mut sensors = Scripted {
        mag_raw: Vector3::new(1.0, 0.0, 0.0),
        have_compass: true,
        ..Default::default()
    };

    for tick in 0..5000u64 {
        sensors.now_us = tick * 1000;
        engine.tick(&sensors);
    }

    assert!(engine.cos_tilt_angle() > 0.9999, "cos_tilt={}", engine.cos_tilt_angle());
    let yaw = engine.attitude().yaw;
    let yaw_error = yaw.min(3600 - yaw);
    assert!(yaw_error <= 5, "yaw={yaw}");
}

/// S2 - Pure 90 degree roll over 1 second of 1ms ticks, references disabled.
#[test]
fn pure_roll_ninety_degrees() {
    let mut engine = new_engine();
    let mut sensors = Scripted {
        gyro_rad_s: Vector3::new(core::f32::consts::FRAC_PI_2, 0.0, 0.0),
        accel_raw: Vector3::zeros(),
        ..Default::default()
    };

    for tick in 0..1000u64 {
        sensors.now_us = tick * 1000;
        engine.tick(&sensors);
    }

    assert!(engine.rotation_matrix()[2][1] < -0.99);
    let roll = engine.attitude().roll;
    assert!((roll - 900).abs() <= 20, "roll={roll}");
}

/// S3 - Disarm reset cycle: Kp boosts to ATTITUDE_RESET_KP after the
/// quiet period, then settles back, converging the attitude.
#[test]
fn disarm_reset_cycle_converges_attitude() {
    let mut engine = new_engine();
    engine.set_attitude_quat(lynch_ahrs::quaternion::from_euler(450, 0, 0));

    let mut sensors = Scripted { armed: false, ..Default::default() };
    sensors.now_us = 0;
    engine.tick(&sensors);

    for tick in 1..800u64 {
        sensors.now_us = tick * 1000;
        engine.tick(&sensors);
    }

    let roll = engine.attitude().roll.abs();
    assert!(roll < 50, "expected roll to have converged near zero, got {roll} decidegrees");
}

/// S4 - A gyro spike during the quiet period restarts the timer, so the
/// reset window stays shut until the craft is quiescent again.
#[test]
fn jiggle_restarts_quiet_period() {
    let mut engine = new_engine();
    let mut sensors = Scripted { armed: false, ..Default::default() };

    engine.tick(&sensors);

    sensors.now_us = 200_000;
    sensors.gyro_rad_s = Vector3::new(20.0f32.to_radians(), 0.0, 0.0);
    engine.tick(&sensors);

    sensors.gyro_rad_s = Vector3::zeros();
    sensors.now_us = 250_000;
    engine.tick(&sensors);
    assert!(!engine.is_level_recovery_active());
}

/// S5 - Dynamic acceleration is rejected outright; the integrator does
/// not accumulate from it.
#[test]
fn accel_rejected_under_dynamic_flight() {
    let mut engine = new_engine();
    let mut sensors = Scripted { accel_raw: Vector3::new(0.0, 0.0, 2.0), ..Default::default() };

    let before = engine.quaternion();
    for tick in 0..200u64 {
        sensors.now_us = tick * 1000;
        engine.tick(&sensors);
    }

    let after = engine.quaternion();
    assert!((after.w - before.w).abs() < 1e-6);
    assert!((after.x - before.x).abs() < 1e-6);
    assert!((after.y - before.y).abs() < 1e-6);
    assert!((after.z - before.z).abs() < 1e-6);
}

/// S6 - GPS course initialization is a one-shot yaw snap, not a gradual
/// correction, on the tick it first becomes usable.
#[test]
fn gps_course_initializes_yaw_directly() {
    let mut engine = new_engine();
    let sensors = Scripted {
        have_gps: true,
        gps_fix: true,
        gps_num_sat: 8,
        gps_ground_speed_cm_s: 600,
        gps_course_rad: core::f32::consts::FRAC_PI_2,
        ..Default::default()
    };

    engine.tick(&sensors);
    let mut sensors_next = sensors;
    sensors_next.now_us = 1000;
    engine.tick(&sensors_next);

    let yaw = engine.attitude().yaw;
    assert!((yaw - 900).abs() <= 5, "expected yaw near 900 decidegrees, got {yaw}");
}

/// Invariant 9: a tick at the spin-rate limit still integrates the
/// gyro (the freeze only withholds the *integral* term, covered
/// directly in `mahony::tests::spin_above_limit_freezes_integrator`).
#[test]
fn spin_rate_boundary_still_integrates_gyro() {
    let mut engine = new_engine();
    let sensors = Scripted {
        gyro_rad_s: Vector3::new(20.0f32.to_radians(), 0.0, 0.0),
        accel_raw: Vector3::new(0.1, 0.0, 0.99),
        ..Default::default()
    };
    engine.tick(&sensors);
    assert_ne!(engine.quaternion(), lynch_ahrs::Quaternion::IDENTITY);
}

/// Invariant 10: accel strength boundary conditions.
#[test]
fn accel_strength_boundaries_via_engine() {
    use lynch_ahrs::reference::accelerometer_strength;
    assert_eq!(accelerometer_strength(Vector3::new(0.0, 0.0, (0.5f32).sqrt()), 1.0), 0.0);
    assert!((accelerometer_strength(Vector3::new(0.0, 0.0, 1.0), 1.0) - 1.0).abs() < 1e-6);
}

/// Invariant 11: head-free zero boundary at 45 degrees.
#[test]
fn headfree_offset_boundary_via_engine() {
    let mut engine = new_engine();
    engine.set_attitude_quat(lynch_ahrs::quaternion::from_euler(449, 0, 0));
    engine.tick(&Scripted::default());
    assert!(engine.set_headfree_offset());

    let mut engine2 = new_engine();
    engine2.set_attitude_quat(lynch_ahrs::quaternion::from_euler(451, 0, 0));
    engine2.tick(&Scripted::default());
    assert!(!engine2.set_headfree_offset());
}

/// Invariants 12-13: config validation surfaces distinct errors and
/// documented defaults descale correctly.
#[test]
fn config_validation_and_defaults() {
    use lynch_ahrs::ConfigError;

    let mut bad = ImuConfig::default();
    bad.throttle_correction_angle = 0;
    assert_eq!(RuntimeConfig::from_config(&bad), Err(ConfigError::InvalidThrottleCorrectionAngle(0)));

    let mut bad = ImuConfig::default();
    bad.level_recovery_time_ms = 0;
    assert_eq!(RuntimeConfig::from_config(&bad), Err(ConfigError::ZeroLevelRecoveryTime));

    let runtime = RuntimeConfig::from_config(&ImuConfig::default()).unwrap();
    assert!((runtime.dcm_kp - 0.25).abs() < 1e-6);
    assert!((runtime.dcm_ki - 7e-4).abs() < 1e-6);
}
