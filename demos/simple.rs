//! Drives an `AhrsEngine` with a scripted, stationary gyro/accel
//! sequence and prints the resulting attitude each tick.

use lynch_ahrs::{AhrsEngine, ImuConfig, ModeContext, RuntimeConfig, SensorSource};
use nalgebra::Vector3;

struct ScriptedSensors {
    gyro_rad_s: Vector3<f32>,
    now_us: u64,
}

impl SensorSource for ScriptedSensors {
    fn gyro_rad_s(&self) -> Vector3<f32> {
        self.gyro_rad_s
    }
    fn accel_raw(&self) -> Vector3<f32> {
        Vector3::new(0.0, 0.0, 1.0)
    }
    fn acc_1g_reciprocal(&self) -> f32 {
        1.0
    }
    fn acc_present(&self) -> bool {
        true
    }
    fn mag_raw(&self) -> Vector3<f32> {
        Vector3::zeros()
    }
    fn have_compass(&self) -> bool {
        false
    }
    fn compass_healthy(&self) -> bool {
        false
    }
    fn gps_rescue_disable_mag(&self) -> bool {
        false
    }
    fn have_gps(&self) -> bool {
        false
    }
    fn gps_fix(&self) -> bool {
        false
    }
    fn gps_num_satellites(&self) -> u8 {
        0
    }
    fn gps_ground_speed_cm_s(&self) -> u32 {
        0
    }
    fn gps_course_over_ground_rad(&self) -> f32 {
        0.0
    }
    fn armed(&self) -> bool {
        true
    }
    fn now_us(&self) -> u64 {
        self.now_us
    }
    fn dt_seconds(&self) -> f32 {
        0.001
    }
    fn mode(&self) -> ModeContext {
        ModeContext::default()
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let config = RuntimeConfig::from_config(&ImuConfig::default()).expect("default config is always valid");
    let mut engine = AhrsEngine::new(config);

    let mut sensors = ScriptedSensors { gyro_rad_s: Vector3::new(0.05, 0.0, 0.0), now_us: 0 };

    for tick in 0..200u64 {
        sensors.now_us = tick * 1000;
        engine.tick(&sensors);

        if tick % 20 == 0 {
            let attitude = engine.attitude();
            println!(
                "tick {tick}: roll={:.1}deg pitch={:.1}deg yaw={:.1}deg cos_tilt={:.3}",
                attitude.roll as f32 / 10.0,
                attitude.pitch as f32 / 10.0,
                attitude.yaw as f32 / 10.0,
                engine.cos_tilt_angle(),
            );
        }
    }
}
