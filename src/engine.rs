//! Top-level orchestration: `AhrsEngine` bundles the filter state, the
//! gain scheduler, and the derived-output layer behind a single
//! `tick()` entry point, plus the read-only accessors and
//! simulator-only setters the host application uses between ticks.

use std::sync::Mutex;

use nalgebra::Vector3;

use crate::config::RuntimeConfig;
use crate::gain::{self, AttitudeResetState, LevelRecoveryState};
use crate::mahony::{self, Integrator, References};
use crate::motors::{self, Axis, DerivedOutputs, EulerAngles, ModeContext, MotorOutput};
use crate::quaternion::{
    acos_complement_to_decideg, compute_rotation_matrix, from_euler, products_of, Quaternion, RotationMatrix,
    ROTATION_IDENTITY,
};
use crate::reference;

/// Per-tick sensor and flight-mode context, supplied by the host
/// application. Modeled as a capability trait rather than queried
/// directly so the engine stays free of any particular sensor driver
/// or RC stack.
pub trait SensorSource {
    fn gyro_rad_s(&self) -> Vector3<f32>;
    fn accel_raw(&self) -> Vector3<f32>;
    fn acc_1g_reciprocal(&self) -> f32;
    fn acc_present(&self) -> bool;

    fn mag_raw(&self) -> Vector3<f32>;
    fn have_compass(&self) -> bool;
    fn compass_healthy(&self) -> bool;
    fn gps_rescue_disable_mag(&self) -> bool;

    fn have_gps(&self) -> bool;
    fn gps_fix(&self) -> bool;
    fn gps_num_satellites(&self) -> u8;
    fn gps_ground_speed_cm_s(&self) -> u32;
    fn gps_course_over_ground_rad(&self) -> f32;

    fn armed(&self) -> bool;
    fn now_us(&self) -> u64;
    fn dt_seconds(&self) -> f32;

    fn mode(&self) -> ModeContext;
}

/// The small amount of data `tick()` returns to the caller each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickOutput {
    pub throttle_angle_correction: i32,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimOverride {
    quat: Option<Quaternion>,
    has_new_data: Option<bool>,
}

/// Bundles all filter state. Not `Clone`/`Copy`: the simulator-override
/// slot is behind a `Mutex` so a host can queue a pose reset from a
/// different thread than the one calling `tick()`, matching the single
/// real-time control thread / Mutex-guarded critical section split the
/// original firmware uses for its simulator link.
pub struct AhrsEngine {
    config: RuntimeConfig,
    q: Quaternion,
    r: RotationMatrix,
    integrator: Integrator,
    attitude_reset: AttitudeResetState,
    level_recovery: LevelRecoveryState,
    outputs: DerivedOutputs,
    gps_course_was_usable: bool,
    attitude_established: bool,
    has_new_data: bool,
    sim_override: Mutex<SimOverride>,
}

impl AhrsEngine {
    pub fn new(config: RuntimeConfig) -> Self {
        let mut outputs = DerivedOutputs::default();
        outputs.configure(config.motor_roll_decideg, config.motor_pitch_decideg, config.motor_yaw_decideg);

        AhrsEngine {
            config,
            q: Quaternion::IDENTITY,
            r: ROTATION_IDENTITY,
            integrator: Integrator::default(),
            attitude_reset: AttitudeResetState::default(),
            level_recovery: LevelRecoveryState::default(),
            outputs,
            gps_course_was_usable: false,
            attitude_established: false,
            has_new_data: true,
            sim_override: Mutex::new(SimOverride::default()),
        }
    }

    /// Run one filter cycle. Fixed ordering: apply any queued simulator
    /// override, evaluate reference-source usability, advance the gain
    /// scheduler, run the Mahony update, then refresh the per-motor
    /// derived outputs from the new attitude.
    ///
    /// With no accelerometer present, or none delivered yet, the accel
    /// contribution is zeroed and the whole attitude update is skipped
    /// for this tick, preserving the last orientation.
    pub fn tick(&mut self, sensors: &dyn SensorSource) -> TickOutput {
        self.apply_sim_override();

        if !sensors.acc_present() {
            let cos_tilt_angle = self.r[2][2];
            return TickOutput {
                throttle_angle_correction: motors::throttle_angle_correction(
                    cos_tilt_angle,
                    self.config.throttle_angle_scale,
                    self.config.throttle_correction_value,
                ),
            };
        }

        let gyro_rad_s = sensors.gyro_rad_s();
        let gyro_deg_s = [gyro_rad_s.x.to_degrees(), gyro_rad_s.y.to_degrees(), gyro_rad_s.z.to_degrees()];

        let use_acc = reference::accelerometer_strength(sensors.accel_raw(), sensors.acc_1g_reciprocal());
        let use_mag = reference::magnetometer_usable(
            sensors.have_compass(),
            sensors.compass_healthy(),
            sensors.gps_rescue_disable_mag(),
            sensors.mag_raw(),
        );
        let use_cog = reference::gps_course_usable(
            use_mag,
            sensors.have_gps(),
            sensors.gps_fix(),
            sensors.gps_num_satellites(),
            sensors.gps_ground_speed_cm_s(),
        );

        // A freshly-acquired GPS course reference re-points yaw directly
        // rather than letting the PI correction slew it in over many
        // ticks; the initializing tick applies no COG correction.
        let cog_just_initialized = use_cog && !self.gps_course_was_usable;
        self.gps_course_was_usable = use_cog;

        if cog_just_initialized {
            let r = compute_rotation_matrix(products_of(self.q));
            let roll = acos_complement_to_decideg(r[2][1]);
            let pitch = acos_complement_to_decideg(-r[2][0]);
            let course_decideg = (sensors.gps_course_over_ground_rad().to_degrees() * 10.0).round() as i32;

            self.q = from_euler(roll, pitch, course_decideg);
            self.r = compute_rotation_matrix(products_of(self.q));
            self.integrator.fb = Vector3::zeros();
        }

        let accel_normalized = if use_acc > 0.0 { sensors.accel_raw().normalize() } else { Vector3::zeros() };
        let mag_normalized = if use_mag { sensors.mag_raw().normalize() } else { Vector3::zeros() };

        self.level_recovery.step(
            sensors.now_us(),
            sensors.armed(),
            gyro_deg_s,
            self.config.level_recovery_threshold_deg_s,
            self.config.level_recovery_time_us,
        );
        let attitude_reset_active = self.attitude_reset.step(sensors.now_us(), sensors.armed(), use_acc, gyro_deg_s);

        let level_recovery_coef = if self.config.level_recovery { self.config.level_recovery_coef } else { 0.0 };
        let kp = gain::scheduled_kp(
            self.config.dcm_kp,
            sensors.armed(),
            attitude_reset_active,
            &self.level_recovery,
            level_recovery_coef,
        );

        let refs = References {
            use_acc,
            accel_normalized,
            use_mag,
            mag_normalized,
            use_cog: use_cog && !cog_just_initialized,
            cog_radians: sensors.gps_course_over_ground_rad(),
        };

        if self.has_new_data {
            let out = mahony::update(
                self.q,
                self.r,
                &mut self.integrator,
                sensors.dt_seconds(),
                gyro_rad_s,
                refs,
                kp,
                self.config.dcm_ki,
            );
            self.q = out.q;
            self.r = out.r;
        }

        if use_acc > 0.0 {
            self.attitude_established = true;
        }

        let cos_tilt_angle = self.r[2][2];

        let debug = self.outputs.update(self.q, self.r, cos_tilt_angle, sensors.mode(), self.config.debug_motor);
        tracing::trace!(
            motor = debug.motor,
            attitude_roll = debug.attitude_roll,
            motor_roll = debug.motor_roll,
            motor_pitch = debug.motor_pitch,
            thrust_milli = debug.thrust_milli,
            "lynch motor tick"
        );

        let throttle_angle_correction =
            motors::throttle_angle_correction(cos_tilt_angle, self.config.throttle_angle_scale, self.config.throttle_correction_value);

        TickOutput { throttle_angle_correction }
    }

    fn apply_sim_override(&mut self) {
        let mut sim = self.sim_override.lock().expect("sim override mutex poisoned");
        if let Some(q) = sim.quat.take() {
            self.q = q;
            let qp = products_of(q);
            self.r = crate::quaternion::compute_rotation_matrix(qp);
            self.integrator = Integrator::default();
        }
        if let Some(flag) = sim.has_new_data.take() {
            self.has_new_data = flag;
        }
    }

    // --- read-only accessors ---

    pub fn quaternion(&self) -> Quaternion {
        self.q
    }

    pub fn rotation_matrix(&self) -> RotationMatrix {
        self.r
    }

    pub fn cos_tilt_angle(&self) -> f32 {
        self.r[2][2]
    }

    pub fn attitude(&self) -> EulerAngles {
        self.outputs.attitude()
    }

    pub fn motor_output(&self, motor: usize) -> MotorOutput {
        self.outputs.motor_output(motor)
    }

    pub fn translation_thrust_fix(&self) -> f32 {
        self.outputs.translation_thrust_fix()
    }

    pub fn angle_angle(&self, axis: Axis) -> i32 {
        self.outputs.angle_angle(axis)
    }

    pub fn is_level_recovery_active(&self) -> bool {
        self.level_recovery.is_active()
    }

    pub fn is_upright(&self, acc_present: bool) -> bool {
        motors::is_upright(acc_present, self.attitude_established, self.cos_tilt_angle(), self.config.small_angle_cos_z)
    }

    /// Zero the head-free reference frame to the current yaw. Returns
    /// `false` (leaving the previous offset in place) if bank exceeds
    /// 45 degrees on either axis.
    pub fn set_headfree_offset(&mut self) -> bool {
        self.outputs.set_headfree_offset(products_of(self.q))
    }

    // --- simulator-only setters ---
    //
    // Queued behind the mutex and applied at the top of the next
    // `tick()` rather than mutating filter state directly, so a
    // concurrent `tick()` call never observes a half-applied pose
    // reset.

    pub fn set_attitude_quat(&self, q: Quaternion) {
        self.sim_override.lock().expect("sim override mutex poisoned").quat = Some(q);
    }

    pub fn set_attitude_rpy(&self, roll_decideg: i32, pitch_decideg: i32, yaw_decideg: i32) {
        let q = from_euler(roll_decideg, pitch_decideg, yaw_decideg);
        self.set_attitude_quat(q);
    }

    pub fn set_has_new_data(&self, flag: bool) {
        self.sim_override.lock().expect("sim override mutex poisoned").has_new_data = Some(flag);
    }
}
