//! Derived-output layer: Euler angles (standard or head-free), the
//! per-motor Lynch-mode tilt pipeline, the thrust-translation offset,
//! and the throttle-angle correction published to the mixer.

use crate::config::MOTOR_COUNT;
use crate::quaternion::{
    acos_complement_to_decideg, atan2_to_wrapped_decideg, mul, mul_with_products, products_from_euler,
    products_of, remove_yaw, ProductOrder, Quaternion, QuatProducts, RotationMatrix,
};

/// Roll/pitch/yaw in decidegrees, yaw normalized to `[0, 3600)`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub roll: i32,
    pub pitch: i32,
    pub yaw: i32,
}

/// Per-motor scalar outputs consumed by the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorOutput {
    pub thrust: f32,
    pub pitch: i32,
    pub roll: i32,
}

/// One motor's quaternion pipeline state.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MotorState {
    /// Configured mount offset, fixed at `configure()` time.
    qpm: QuatProducts,
    qm: Quaternion,
    qlm: Quaternion,
    qtm: Quaternion,
    output: MotorOutput,
}

impl Default for MotorState {
    fn default() -> Self {
        MotorState {
            qpm: QuatProducts::IDENTITY,
            qm: Quaternion::IDENTITY,
            qlm: Quaternion::IDENTITY,
            qtm: Quaternion::IDENTITY,
            output: MotorOutput::default(),
        }
    }
}

/// Which roll/pitch axis an angle-mode reading is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Roll,
    Pitch,
}

/// Flight-mode and stick-input context the derived-output layer needs
/// each tick. Supplied by the host application via [`crate::engine::SensorSource`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeContext {
    pub angle_mode: bool,
    pub set_lynch_mode: bool,
    pub lynch_translate: bool,
    pub headfree_mode: bool,
    pub rc_deflection_roll: f32,
    pub rc_deflection_pitch: f32,
}

/// All state owned by the derived-output layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedOutputs {
    motors: [MotorState; MOTOR_COUNT],
    q_thrust_translation: QuatProducts,
    translation_thrust_fix: f32,
    q_angle_ref: QuatProducts,
    angle_roll: i32,
    angle_pitch: i32,
    headfree_offset: Quaternion,
    headfree: Quaternion,
    attitude: EulerAngles,
    in_angle_mode: bool,
    changed_to_angle: bool,
    motors_initialized: bool,
}

impl Default for DerivedOutputs {
    fn default() -> Self {
        DerivedOutputs {
            motors: [MotorState::default(); MOTOR_COUNT],
            q_thrust_translation: QuatProducts::IDENTITY,
            translation_thrust_fix: 1.0,
            q_angle_ref: QuatProducts::IDENTITY,
            angle_roll: 0,
            angle_pitch: 0,
            headfree_offset: Quaternion::IDENTITY,
            headfree: Quaternion::IDENTITY,
            attitude: EulerAngles::default(),
            in_angle_mode: false,
            changed_to_angle: false,
            motors_initialized: false,
        }
    }
}

/// Trace event payload for the per-motor Lynch-mode debug channel
/// (`DEBUG_LYNCH` in the original), emitted once per tick for the
/// configured `debug_motor`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LynchDebug {
    pub motor: usize,
    pub attitude_roll: i32,
    pub motor_roll: i32,
    pub motor_pitch: i32,
    pub thrust_milli: i32,
}

impl DerivedOutputs {
    /// Populate each motor's fixed mount-offset product cache from
    /// configuration. Called once from `configure()`.
    pub fn configure(
        &mut self,
        motor_roll_decideg: [i32; MOTOR_COUNT],
        motor_pitch_decideg: [i32; MOTOR_COUNT],
        motor_yaw_decideg: [i32; MOTOR_COUNT],
    ) {
        for i in 0..MOTOR_COUNT {
            self.motors[i].qpm = products_from_euler(motor_roll_decideg[i], motor_pitch_decideg[i], motor_yaw_decideg[i]);
        }
        self.q_angle_ref = products_from_euler(0, 0, 0);
        self.q_thrust_translation = products_from_euler(0, 0, 0);
    }

    pub fn attitude(&self) -> EulerAngles {
        self.attitude
    }

    pub fn motor_output(&self, motor: usize) -> MotorOutput {
        self.motors[motor].output
    }

    pub fn translation_thrust_fix(&self) -> f32 {
        self.translation_thrust_fix
    }

    pub fn angle_angle(&self, axis: Axis) -> i32 {
        match axis {
            Axis::Roll => self.angle_roll,
            Axis::Pitch => self.angle_pitch,
        }
    }

    /// Attempt to zero the head-free reference frame to the current
    /// yaw. Rejected (and `headfree_offset` left untouched) if bank
    /// exceeds 45 degrees on either axis.
    pub fn set_headfree_offset(&mut self, qp: QuatProducts) -> bool {
        if self.attitude.roll.abs() >= 450 || self.attitude.pitch.abs() >= 450 {
            return false;
        }

        let yaw = -(2.0 * (qp.wz + qp.xy)).atan2(1.0 - 2.0 * (qp.yy + qp.zz));
        self.headfree_offset = Quaternion::new((yaw / 2.0).cos(), 0.0, 0.0, (yaw / 2.0).sin());
        true
    }

    /// Run the derived-output layer for one tick. Returns the Lynch
    /// debug payload for the configured motor, for the caller to trace.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        q: Quaternion,
        r: RotationMatrix,
        cos_tilt_angle: f32,
        mode: ModeContext,
        debug_motor: usize,
    ) -> LynchDebug {
        if mode.headfree_mode {
            self.headfree = mul(self.headfree_offset, q);
            let qp = products_of(self.headfree);
            self.attitude.roll = atan2_to_wrapped_decideg(-2.0 * (qp.wx + qp.yz), -(1.0 - 2.0 * (qp.xx + qp.yy)));
            self.attitude.pitch = acos_complement_to_decideg(2.0 * (qp.wy - qp.xz));
            self.attitude.yaw = atan2_to_wrapped_decideg(2.0 * (qp.wz + qp.xy), 1.0 - 2.0 * (qp.yy + qp.zz));
        } else {
            self.attitude.roll = acos_complement_to_decideg(r[2][1]);
            self.attitude.pitch = acos_complement_to_decideg(-r[2][0]);
            self.attitude.yaw = atan2_to_wrapped_decideg(r[1][0], r[0][0]);
        }

        self.apply_thrust_translation(mode, cos_tilt_angle);

        let recompute_mounts =
            mode.set_lynch_mode || (mode.angle_mode && !self.changed_to_angle) || !self.motors_initialized;

        let mut debug = LynchDebug { motor: debug_motor, attitude_roll: self.attitude.roll, motor_roll: 0, motor_pitch: 0, thrust_milli: 0 };

        for i in 0..MOTOR_COUNT {
            let motor = &mut self.motors[i];
            if recompute_mounts {
                motor.qm = mul_with_products(q, motor.qpm, ProductOrder::First);
                motor.qlm = motor.qm;
            }
            motor.qtm = mul_with_products(motor.qlm, self.q_thrust_translation, ProductOrder::First);

            let thrust = 1.0 - 2.0 * motor.qtm.x * motor.qtm.x - 2.0 * motor.qtm.y * motor.qtm.y;
            let pitch = acos_complement_to_decideg(-(2.0 * (motor.qtm.x * motor.qtm.z - motor.qtm.w * motor.qtm.y)));
            let roll = acos_complement_to_decideg(2.0 * (motor.qtm.y * motor.qtm.z + motor.qtm.w * motor.qtm.x));

            if i == debug_motor {
                debug.motor_roll = roll;
                debug.motor_pitch = pitch;
                debug.thrust_milli = (thrust * 1000.0).round() as i32;
            }

            if recompute_mounts || mode.angle_mode || mode.lynch_translate {
                motor.output = MotorOutput { thrust, pitch, roll };
            }
        }

        self.changed_to_angle = mode.angle_mode;
        self.motors_initialized = true;

        self.attitude.roll = acos_complement_to_decideg(r[2][1]);

        self.update_angle_reference(q, mode);

        let qa = mul_with_products(q, self.q_angle_ref, ProductOrder::First);
        self.angle_pitch = acos_complement_to_decideg(-(2.0 * (qa.x * qa.z - qa.w * qa.y)));
        self.angle_roll = acos_complement_to_decideg(2.0 * (qa.y * qa.z + qa.w * qa.x));

        if self.attitude.yaw < 0 {
            self.attitude.yaw += 3600;
        }

        debug
    }

    fn apply_thrust_translation(&mut self, mode: ModeContext, cos_tilt_angle: f32) {
        if mode.lynch_translate {
            let roll_translation = mode.rc_deflection_roll * 450.0;
            let pitch_translation = mode.rc_deflection_pitch * 450.0;

            let pitch_signed = if cos_tilt_angle > 0.0 { -pitch_translation } else { pitch_translation };
            self.q_thrust_translation =
                products_from_euler(-roll_translation as i32, pitch_signed as i32, 0);

            let fix = (roll_translation / 10.0).to_radians().cos() * (pitch_translation / 10.0).to_radians().cos();
            self.translation_thrust_fix = 1.0 / fix;
        } else {
            self.q_thrust_translation = products_from_euler(0, 0, 0);
            self.translation_thrust_fix = 1.0;
        }
    }

    fn update_angle_reference(&mut self, q: Quaternion, mode: ModeContext) {
        let large_stick = mode.rc_deflection_roll.abs() > 0.1 || mode.rc_deflection_pitch.abs() > 0.1;
        let entering_angle_mode = (mode.angle_mode && !self.in_angle_mode)
            || (mode.angle_mode && mode.set_lynch_mode && large_stick);

        if entering_angle_mode {
            self.in_angle_mode = true;
            let conj = q.conjugate();
            let mut qp = products_of(conj);
            remove_yaw(&mut qp, self.attitude.yaw);
            self.q_angle_ref = qp;
        } else if !mode.angle_mode {
            self.in_angle_mode = false;
        }
    }
}

/// Throttle-angle correction published to the mixer: zero when tilt is
/// at/beyond vertical (`cos_tilt_angle <= 0.015`), otherwise a sine
/// ramp of the configured correction value, clamped at a 90 degree
/// tilt.
pub fn throttle_angle_correction(cos_tilt_angle: f32, throttle_angle_scale: f32, throttle_correction_value: u8) -> i32 {
    if cos_tilt_angle <= 0.015 {
        return 0;
    }

    let mut angle = (cos_tilt_angle.clamp(-1.0, 1.0).acos() * throttle_angle_scale).round() as i32;
    if angle > 900 {
        angle = 900;
    }

    (throttle_correction_value as f32 * (angle as f32 * core::f32::consts::PI / 1800.0).sin()).round() as i32
}

/// `isUpright`: established attitude and tilt within the configured
/// small-angle cone.
pub fn is_upright(acc_present: bool, attitude_established: bool, cos_tilt_angle: f32, small_angle_cos_z: f32) -> bool {
    !acc_present || (attitude_established && cos_tilt_angle > small_angle_cos_z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quaternion::{compute_rotation_matrix, from_euler};

    #[test]
    fn zero_motor_config_yields_identity_offsets() {
        let mut outputs = DerivedOutputs::default();
        outputs.configure([0; MOTOR_COUNT], [0; MOTOR_COUNT], [0; MOTOR_COUNT]);
        for m in &outputs.motors {
            assert!((m.qpm.w - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn motor_quaternions_stay_unit_norm() {
        let mut outputs = DerivedOutputs::default();
        outputs.configure([50, -50, 0, 0, 20, -20], [0, 0, 50, -50, 10, -10], [0; MOTOR_COUNT]);

        let q = from_euler(100, -50, 300);
        let qp = products_of(q);
        let r = compute_rotation_matrix(qp);

        outputs.update(q, r, r[2][2], ModeContext { angle_mode: true, ..Default::default() }, 0);

        for m in &outputs.motors {
            let norm_sq = m.qtm.w * m.qtm.w + m.qtm.x * m.qtm.x + m.qtm.y * m.qtm.y + m.qtm.z * m.qtm.z;
            assert!((norm_sq - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn yaw_is_normalized_non_negative() {
        let mut outputs = DerivedOutputs::default();
        outputs.configure([0; MOTOR_COUNT], [0; MOTOR_COUNT], [0; MOTOR_COUNT]);
        let q = from_euler(0, 0, -900);
        let r = compute_rotation_matrix(products_of(q));
        outputs.update(q, r, r[2][2], ModeContext::default(), 0);
        assert!(outputs.attitude().yaw >= 0 && outputs.attitude().yaw < 3600);
    }

    #[test]
    fn headfree_zero_rejected_beyond_45_degrees() {
        let mut outputs = DerivedOutputs::default();
        outputs.configure([0; MOTOR_COUNT], [0; MOTOR_COUNT], [0; MOTOR_COUNT]);

        outputs.attitude.roll = 449;
        outputs.attitude.pitch = 0;
        let before = outputs.headfree_offset;
        assert!(outputs.set_headfree_offset(QuatProducts::IDENTITY));
        assert_ne!(outputs.headfree_offset.w, 0.0); // sanity: offset assigned

        let mut outputs2 = DerivedOutputs::default();
        outputs2.attitude.roll = 451;
        let unchanged = outputs2.headfree_offset;
        assert!(!outputs2.set_headfree_offset(QuatProducts::IDENTITY));
        assert_eq!(outputs2.headfree_offset, unchanged);
        let _ = before;
    }

    #[test]
    fn throttle_correction_zero_past_vertical() {
        assert_eq!(throttle_angle_correction(0.0, 22.5, 0), 0);
        assert_eq!(throttle_angle_correction(0.01, 22.5, 10), 0);
    }

    #[test]
    fn upright_requires_established_attitude() {
        assert!(is_upright(false, false, 0.0, 0.0));
        assert!(!is_upright(true, false, 1.0, -1.0));
        assert!(is_upright(true, true, 1.0, 0.0));
    }
}
