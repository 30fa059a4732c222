//! The crate's only fallible surface: validating a persisted
//! configuration record. The tick itself never returns a `Result` —
//! all per-tick failure modes are recovered locally by zero-weighting
//! a contribution.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("dcm_kp must be non-negative, got {0}")]
    NegativeDcmKp(f32),

    #[error("dcm_ki must be non-negative, got {0}")]
    NegativeDcmKi(f32),

    #[error("throttle_correction_angle must be in (0, 900] decidegrees, got {0}")]
    InvalidThrottleCorrectionAngle(u16),

    #[error("level_recovery_time must be non-zero while level_recovery is enabled")]
    ZeroLevelRecoveryTime,
}
