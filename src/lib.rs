//! Attitude-and-heading reference system for a multirotor flight
//! controller: a Mahony complementary filter with adaptive gain
//! scheduling, blended accelerometer/magnetometer/GPS reference
//! sources, and a per-motor "Lynch mode" tilt-rotor pipeline.

pub mod config;
pub mod engine;
pub mod error;
pub mod gain;
pub mod mahony;
pub mod motors;
pub mod quaternion;
pub mod reference;

pub use config::{ImuConfig, RuntimeConfig, MOTOR_COUNT};
pub use engine::{AhrsEngine, SensorSource, TickOutput};
pub use error::ConfigError;
pub use motors::{Axis, EulerAngles, ModeContext, MotorOutput};
pub use quaternion::{Quaternion, QuatProducts, RotationMatrix};
