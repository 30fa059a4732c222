//! The Mahony complementary-filter update: combines gyro integration
//! with a proportional-integral correction derived from the reference
//! sources evaluated by [`crate::reference`].
//!
//! Follows the classic Mahony shape (gyro + reference error -> corrected
//! rate -> quaternion integration -> renormalize), but the error vector
//! is assembled from up to three independent references (accel, mag,
//! GPS course) rather than a single combined accel+mag gradient, and the
//! integral term is gated by a spin-rate guard.

use nalgebra::Vector3;

use crate::quaternion::{compute_rotation_matrix, products_of, Quaternion, RotationMatrix};
use crate::reference::{cog_error_body_frame, mag_error_body_frame};

/// Angular rate magnitude above which integral accumulation is frozen
/// ("dizzy guard"), in radians/second.
pub const SPIN_RATE_LIMIT_RAD_S: f32 = 20.0 * core::f32::consts::PI / 180.0;

/// Running integrator state for the Mahony PI correction. Reset to zero
/// whenever `ki == 0` (anti-windup); otherwise retained across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Integrator {
    pub fb: Vector3<f32>,
}

/// The set of reference inputs available to a single Mahony update.
#[derive(Debug, Clone, Copy)]
pub struct References {
    /// Accelerometer trust in `[0, 1]`, from [`crate::reference::accelerometer_strength`].
    pub use_acc: f32,
    /// Normalized body-frame gravity direction estimate (only meaningful if `use_acc > 0`).
    pub accel_normalized: Vector3<f32>,
    pub use_mag: bool,
    /// Normalized body-frame magnetic field measurement (only meaningful if `use_mag`).
    pub mag_normalized: Vector3<f32>,
    pub use_cog: bool,
    /// Ground course, radians, wrapped to `(-pi, pi]`.
    pub cog_radians: f32,
}

/// Result of one Mahony update: the refreshed quaternion and DCM.
#[derive(Debug, Clone, Copy)]
pub struct MahonyOutput {
    pub q: Quaternion,
    pub r: RotationMatrix,
}

/// Run one Mahony PI update.
///
/// `gyro_rad_s` is the body-frame angular rate in radians/second. `dt`
/// is the tick period in seconds. `kp` is the gain scheduled for this
/// tick by [`crate::gain`]; `ki` comes straight from [`crate::config::RuntimeConfig`].
pub fn update(
    q: Quaternion,
    r: RotationMatrix,
    integrator: &mut Integrator,
    dt: f32,
    gyro_rad_s: Vector3<f32>,
    refs: References,
    kp: f32,
    ki: f32,
) -> MahonyOutput {
    let spin_rate = gyro_rad_s.norm();

    let mut e = Vector3::zeros();

    if refs.use_cog {
        e += cog_error_body_frame(r, refs.cog_radians);
    }

    if refs.use_mag {
        if let Some(mag_error) = mag_error_body_frame(r, refs.mag_normalized) {
            e += mag_error;
        }
    }

    if refs.use_acc > 0.0 {
        let gravity_estimate = Vector3::new(r[2][0], r[2][1], r[2][2]);
        e += gravity_estimate.cross(&refs.accel_normalized) * refs.use_acc;
    }

    if ki > 0.0 {
        if spin_rate < SPIN_RATE_LIMIT_RAD_S {
            integrator.fb += e * (ki * dt * refs.use_acc);
        }
    } else {
        integrator.fb = Vector3::zeros();
    }

    let corrected_rate = gyro_rad_s + e * (kp * refs.use_acc) + integrator.fb;

    let half_rate = corrected_rate * (0.5 * dt);
    let rate_quat = Quaternion::new(0.0, half_rate.x, half_rate.y, half_rate.z);

    // q <- q + (dt/2) * Omega(g) * q, i.e. q + q*rate_quat, unnormalized.
    // This additive integration step is distinct from `quaternion::mul`,
    // which always renormalizes its result; here the un-normalized
    // Hamilton product is added to `q` before a single normalization.
    let dq = raw_hamilton_product(q, rate_quat);

    let integrated = Quaternion::new(q.w + dq.w, q.x + dq.x, q.y + dq.y, q.z + dq.z);
    let normalized = normalize(integrated);

    let qp = products_of(normalized);
    let r = compute_rotation_matrix(qp);

    MahonyOutput { q: normalized, r }
}

fn raw_hamilton_product(a: Quaternion, b: Quaternion) -> Quaternion {
    Quaternion::new(
        a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
        a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
        a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
    )
}

fn normalize(q: Quaternion) -> Quaternion {
    use crate::quaternion::fast_inv_sqrt;
    let recip_norm = fast_inv_sqrt(q.w * q.w + q.x * q.x + q.y * q.y + q.z * q.z);
    Quaternion::new(q.w * recip_norm, q.x * recip_norm, q.y * recip_norm, q.z * recip_norm)
}
