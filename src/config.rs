//! Configuration record consumed once at `RuntimeConfig::from_config`
//! time. `ImuConfig` mirrors the persisted, fixed-point-scaled record
//! the original firmware keeps in flash (gains stored as the value
//! times 10000); `RuntimeConfig` is the descaled, validated,
//! floating-point form the engine actually runs with.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-motor mount orientation, in whole degrees, matching the
/// original's `roll[6]`, `pitch[6]`, `yaw[6]` config arrays.
pub const MOTOR_COUNT: usize = 6;

/// The persisted configuration record, as it would be read back from
/// flash / a config file. Gain fields use the original's fixed-point
/// scaling (x10000) so a stored configuration can be loaded byte-for-byte
/// across a port.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// `dcm_kp * 10000`.
    pub dcm_kp: u32,
    /// `dcm_ki * 10000`.
    pub dcm_ki: u32,
    /// Small-angle threshold, whole degrees.
    pub small_angle: u16,
    pub level_recovery: bool,
    pub level_recovery_time_ms: u32,
    pub level_recovery_coef: u32,
    pub level_recovery_threshold_deg_s: u32,
    pub motor_roll_deg: [i16; MOTOR_COUNT],
    pub motor_pitch_deg: [i16; MOTOR_COUNT],
    pub motor_yaw_deg: [i16; MOTOR_COUNT],
    /// 1-based index of the motor whose Lynch-mode quantities are traced.
    pub debug_motor: u8,
    /// Decidegrees of tilt at which `throttle_correction_value` is fully applied.
    pub throttle_correction_angle: u16,
    pub throttle_correction_value: u8,
}

impl Default for ImuConfig {
    fn default() -> Self {
        ImuConfig {
            dcm_kp: 2500,
            dcm_ki: 7,
            small_angle: 180,
            level_recovery: true,
            level_recovery_time_ms: 2500,
            level_recovery_coef: 5,
            level_recovery_threshold_deg_s: 1900,
            motor_roll_deg: [0; MOTOR_COUNT],
            motor_pitch_deg: [0; MOTOR_COUNT],
            motor_yaw_deg: [0; MOTOR_COUNT],
            debug_motor: 1,
            throttle_correction_angle: 800,
            throttle_correction_value: 0,
        }
    }
}

/// The descaled, validated configuration the engine is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeConfig {
    pub dcm_kp: f32,
    pub dcm_ki: f32,
    pub small_angle_cos_z: f32,
    pub level_recovery: bool,
    pub level_recovery_time_us: u64,
    pub level_recovery_coef: f32,
    pub level_recovery_threshold_deg_s: f32,
    pub motor_roll_decideg: [i32; MOTOR_COUNT],
    pub motor_pitch_decideg: [i32; MOTOR_COUNT],
    pub motor_yaw_decideg: [i32; MOTOR_COUNT],
    pub debug_motor: usize,
    pub throttle_angle_scale: f32,
    pub throttle_correction_value: u8,
}

impl RuntimeConfig {
    /// Descale and validate a persisted [`ImuConfig`].
    pub fn from_config(config: &ImuConfig) -> Result<RuntimeConfig, ConfigError> {
        let dcm_kp = config.dcm_kp as f32 / 10000.0;
        let dcm_ki = config.dcm_ki as f32 / 10000.0;

        if dcm_kp < 0.0 {
            return Err(ConfigError::NegativeDcmKp(dcm_kp));
        }
        if dcm_ki < 0.0 {
            return Err(ConfigError::NegativeDcmKi(dcm_ki));
        }
        if config.throttle_correction_angle == 0 || config.throttle_correction_angle > 900 {
            return Err(ConfigError::InvalidThrottleCorrectionAngle(config.throttle_correction_angle));
        }
        if config.level_recovery && config.level_recovery_time_ms == 0 {
            return Err(ConfigError::ZeroLevelRecoveryTime);
        }

        let small_angle_cos_z = (config.small_angle as f32).to_radians().cos();
        let throttle_angle_scale =
            (1800.0 / core::f32::consts::PI) * (900.0 / config.throttle_correction_angle as f32);

        let widen = |arr: [i16; MOTOR_COUNT]| -> [i32; MOTOR_COUNT] {
            let mut out = [0i32; MOTOR_COUNT];
            for i in 0..MOTOR_COUNT {
                out[i] = arr[i] as i32 * 10;
            }
            out
        };

        Ok(RuntimeConfig {
            dcm_kp,
            dcm_ki,
            small_angle_cos_z,
            level_recovery: config.level_recovery,
            level_recovery_time_us: config.level_recovery_time_ms as u64 * 1000,
            level_recovery_coef: config.level_recovery_coef as f32,
            level_recovery_threshold_deg_s: config.level_recovery_threshold_deg_s as f32,
            motor_roll_decideg: widen(config.motor_roll_deg),
            motor_pitch_decideg: widen(config.motor_pitch_deg),
            motor_yaw_decideg: widen(config.motor_yaw_deg),
            debug_motor: config.debug_motor.saturating_sub(1) as usize,
            throttle_angle_scale,
            throttle_correction_value: config.throttle_correction_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_descale_to_documented_typical_values() {
        let runtime = RuntimeConfig::from_config(&ImuConfig::default()).unwrap();
        assert!((runtime.dcm_kp - 0.25).abs() < 1e-6);
        assert!((runtime.dcm_ki - 0.0007).abs() < 1e-6);
        assert!(runtime.level_recovery);
        assert_eq!(runtime.level_recovery_time_us, 2_500_000);
        assert_eq!(runtime.debug_motor, 0);
    }

    #[test]
    fn zero_gain_is_a_valid_boundary() {
        let mut config = ImuConfig::default();
        config.dcm_kp = 0;
        config.dcm_ki = 0;
        assert!(RuntimeConfig::from_config(&config).is_ok());
    }

    #[test]
    fn rejects_invalid_throttle_angle() {
        let mut config = ImuConfig::default();
        config.throttle_correction_angle = 0;
        assert_eq!(
            RuntimeConfig::from_config(&config),
            Err(ConfigError::InvalidThrottleCorrectionAngle(0))
        );

        config.throttle_correction_angle = 901;
        assert_eq!(
            RuntimeConfig::from_config(&config),
            Err(ConfigError::InvalidThrottleCorrectionAngle(901))
        );
    }

    #[test]
    fn rejects_zero_level_recovery_time_when_enabled() {
        let mut config = ImuConfig::default();
        config.level_recovery_time_ms = 0;
        assert_eq!(RuntimeConfig::from_config(&config), Err(ConfigError::ZeroLevelRecoveryTime));

        config.level_recovery = false;
        assert!(RuntimeConfig::from_config(&config).is_ok());
    }
}
