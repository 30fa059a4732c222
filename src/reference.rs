//! Reference-source evaluator: decides, per tick, whether accelerometer,
//! magnetometer, and GPS course-over-ground are usable, and computes the
//! scalars the Mahony update needs from them.

use nalgebra::Vector3;

use crate::quaternion::RotationMatrix;

pub const GPS_MIN_SATELLITES: u8 = 5;
pub const GPS_MIN_GROUND_SPEED_CM_S: u32 = 500;
const MAG_NORM_SQ_MIN: f32 = 0.01;

/// Accelerometer trust in `[0, 1]` from `|a|^2 * acc_1g_reciprocal^2`.
///
/// `< 0.5` or `> 1.69` is rejected outright (strength 0); the two
/// adjoining ranges ramp linearly up to / down from full trust at
/// `1.0`, giving soft rejection under dynamic acceleration instead of a
/// hard on/off gate.
pub fn accelerometer_strength(acc_raw: Vector3<f32>, acc_1g_reciprocal: f32) -> f32 {
    let mag_sq = acc_raw.norm_squared() * acc_1g_reciprocal * acc_1g_reciprocal;

    if mag_sq <= 0.5 || mag_sq >= 1.69 {
        return 0.0;
    }

    if mag_sq > 1.0 {
        scale_range(mag_sq, 1.0, 1.69, 1.0, 0.0)
    } else {
        scale_range(mag_sq, 0.5, 1.0, 0.0, 1.0)
    }
}

fn scale_range(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    out_min + (value - in_min) * (out_max - out_min) / (in_max - in_min)
}

/// `useMag = have_compass && compass_healthy && !gps_rescue_disable_mag && |m|^2 > 0.01`.
pub fn magnetometer_usable(
    have_compass: bool,
    compass_healthy: bool,
    gps_rescue_disable_mag: bool,
    mag_raw: Vector3<f32>,
) -> bool {
    have_compass && compass_healthy && !gps_rescue_disable_mag && mag_raw.norm_squared() > MAG_NORM_SQ_MIN
}

/// `useCOG = !useMag && have_gps && gps_fix && num_sat >= 5 && ground_speed_cm_s >= 500`.
pub fn gps_course_usable(
    use_mag: bool,
    have_gps: bool,
    gps_fix: bool,
    gps_num_sat: u8,
    gps_ground_speed_cm_s: u32,
) -> bool {
    !use_mag
        && have_gps
        && gps_fix
        && gps_num_sat >= GPS_MIN_SATELLITES
        && gps_ground_speed_cm_s >= GPS_MIN_GROUND_SPEED_CM_S
}

/// Wrap a course-over-ground angle, in radians, into `(-pi, pi]`.
pub fn wrap_course_radians(mut cog: f32) -> f32 {
    use core::f32::consts::PI;
    while cog > PI {
        cog -= 2.0 * PI;
    }
    while cog < -PI {
        cog += 2.0 * PI;
    }
    cog
}

/// Earth-frame heading-error-induced body-frame vector contributed by
/// the GPS course-over-ground reference, before it is added into the
/// Mahony error accumulator: `R[2][.] * e_z_ef`.
pub fn cog_error_body_frame(r: RotationMatrix, cog_radians: f32) -> Vector3<f32> {
    let cog = wrap_course_radians(cog_radians);
    let ez_ef = -cog.sin() * r[0][0] - cog.cos() * r[1][0];
    Vector3::new(r[2][0] * ez_ef, r[2][1] * ez_ef, r[2][2] * ez_ef)
}

/// Earth-frame heading-error-induced body-frame vector contributed by
/// the magnetometer reference (heading only; roll/pitch untouched).
/// Returns `None` if the magnetometer is degenerate (`|m|^2 <= 0.01`).
pub fn mag_error_body_frame(r: RotationMatrix, mag_normalized: Vector3<f32>) -> Option<Vector3<f32>> {
    if mag_normalized.norm_squared() <= MAG_NORM_SQ_MIN {
        return None;
    }

    let hx = r[0][0] * mag_normalized.x + r[0][1] * mag_normalized.y + r[0][2] * mag_normalized.z;
    let hy = r[1][0] * mag_normalized.x + r[1][1] * mag_normalized.y + r[1][2] * mag_normalized.z;
    let bx = (hx * hx + hy * hy).sqrt();

    let ez_ef = -(hy * bx);
    Some(Vector3::new(r[2][0] * ez_ef, r[2][1] * ez_ef, r[2][2] * ez_ef))
}
