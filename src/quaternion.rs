//! Quaternion algebra kernel.
//!
//! Hand-rolled rather than built on `nalgebra::Quaternion` directly: the
//! Mahony update and the per-motor pipeline both need a quaternion
//! *product cache* (`QuatProducts`) as a first-class operand, and the
//! reduced eight-multiply composition form, neither of which nalgebra's
//! quaternion type exposes. `nalgebra::Vector3` is still used for the
//! plain vector algebra (cross products, norms) in the reference
//! evaluator and Mahony update.

use core::f32::consts::PI;

/// A unit quaternion `(w, x, y, z)` representing a body-to-earth rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Quaternion { w, x, y, z }
    }

    pub fn conjugate(self) -> Quaternion {
        Quaternion::new(self.w, -self.x, -self.y, -self.z)
    }

    fn norm_sq(self) -> f32 {
        self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z
    }

    fn normalized(self) -> Quaternion {
        let recip_norm = fast_inv_sqrt(self.norm_sq());
        Quaternion::new(
            self.w * recip_norm,
            self.x * recip_norm,
            self.y * recip_norm,
            self.z * recip_norm,
        )
    }
}

/// The ten pairwise products of a unit quaternion's components, plus a
/// copy of the source components. Shadows a `Quaternion` and must be
/// refreshed (via [`products_of`]) immediately after any write to it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuatProducts {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub ww: f32,
    pub wx: f32,
    pub wy: f32,
    pub wz: f32,
    pub xx: f32,
    pub xy: f32,
    pub xz: f32,
    pub yy: f32,
    pub yz: f32,
    pub zz: f32,
}

impl QuatProducts {
    pub const IDENTITY: QuatProducts = QuatProducts {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
        ww: 1.0,
        wx: 0.0,
        wy: 0.0,
        wz: 0.0,
        xx: 0.0,
        xy: 0.0,
        xz: 0.0,
        yy: 0.0,
        yz: 0.0,
        zz: 0.0,
    };

    pub fn as_quaternion(self) -> Quaternion {
        Quaternion::new(self.w, self.x, self.y, self.z)
    }
}

/// Row-major 3x3 direction cosine matrix.
pub type RotationMatrix = [[f32; 3]; 3];

pub const ROTATION_IDENTITY: RotationMatrix = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// `1/sqrt(x)`. The original firmware used a bit-hack fast inverse
/// square root; on a desktop target the plain reciprocal is both faster
/// and exact, and matches `1.0/sqrt(x)` to within 1 ULP.
pub fn fast_inv_sqrt(x: f32) -> f32 {
    1.0 / x.sqrt()
}

/// Hamilton product of two quaternions, normalized, computed via the
/// reduced eight-multiply grouping (`A..H`) rather than the naive
/// sixteen-multiply expansion.
pub fn mul(q1: Quaternion, q2: Quaternion) -> Quaternion {
    let a = (q1.w + q1.x) * (q2.w + q2.x);
    let b = (q1.z - q1.y) * (q2.y - q2.z);
    let c = (q1.w - q1.x) * (q2.y + q2.z);
    let d = (q1.y + q1.z) * (q2.w - q2.x);
    let e = (q1.x + q1.z) * (q2.x + q2.y);
    let f = (q1.x - q1.z) * (q2.x - q2.y);
    let g = (q1.w + q1.y) * (q2.w - q2.z);
    let h = (q1.w - q1.y) * (q2.w + q2.z);

    let result = Quaternion::new(
        b + (-e - f + g + h) / 2.0,
        a - (e + f + g + h) / 2.0,
        c + (e - f + g - h) / 2.0,
        d + (e - f - g + h) / 2.0,
    );
    result.normalized()
}

/// Which operand order to use in [`mul_with_products`]: `First` composes
/// `q1 ⊗ qp2`, `Second` composes `qp2 ⊗ q1` (the original's `order == 2`
/// branch swaps which cache term feeds `A..H`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductOrder {
    First,
    Second,
}

/// Hamilton product where the second operand is already a product
/// cache, avoiding the recomputation `products_of` would otherwise
/// require on every call.
pub fn mul_with_products(q1: Quaternion, qp2: QuatProducts, order: ProductOrder) -> Quaternion {
    let (a, b, c, d, e, f, g, h) = match order {
        ProductOrder::First => (
            (q1.w + q1.x) * (qp2.w + qp2.x),
            (q1.z - q1.y) * (qp2.y - qp2.z),
            (q1.w - q1.x) * (qp2.y + qp2.z),
            (q1.y + q1.z) * (qp2.w - qp2.x),
            (q1.x + q1.z) * (qp2.x + qp2.y),
            (q1.x - q1.z) * (qp2.x - qp2.y),
            (q1.w + q1.y) * (qp2.w - qp2.z),
            (q1.w - q1.y) * (qp2.w + qp2.z),
        ),
        ProductOrder::Second => (
            (qp2.w + qp2.x) * (q1.w + q1.x),
            (qp2.z - qp2.y) * (q1.y - q1.z),
            (qp2.w - qp2.x) * (q1.y + q1.z),
            (qp2.y + qp2.z) * (q1.w - q1.x),
            (qp2.x + qp2.z) * (q1.x + q1.y),
            (qp2.x - qp2.z) * (q1.x - q1.y),
            (qp2.w + qp2.y) * (q1.w - q1.z),
            (qp2.w - qp2.y) * (q1.w + q1.z),
        ),
    };

    let result = Quaternion::new(
        b + (-e - f + g + h) / 2.0,
        a - (e + f + g + h) / 2.0,
        c + (e - f + g - h) / 2.0,
        d + (e - f - g + h) / 2.0,
    );
    result.normalized()
}

/// Compute the ten pairwise products (and a components copy) of `q`.
pub fn products_of(q: Quaternion) -> QuatProducts {
    QuatProducts {
        w: q.w,
        x: q.x,
        y: q.y,
        z: q.z,
        ww: q.w * q.w,
        wx: q.w * q.x,
        wy: q.w * q.y,
        wz: q.w * q.z,
        xx: q.x * q.x,
        xy: q.x * q.y,
        xz: q.x * q.z,
        yy: q.y * q.y,
        yz: q.y * q.z,
        zz: q.z * q.z,
    }
}

/// Synthesize the direction cosine matrix from a product cache.
pub fn compute_rotation_matrix(qp: QuatProducts) -> RotationMatrix {
    [
        [
            1.0 - 2.0 * qp.yy - 2.0 * qp.zz,
            2.0 * (qp.xy - qp.wz),
            2.0 * (qp.xz + qp.wy),
        ],
        [
            2.0 * (qp.xy + qp.wz),
            1.0 - 2.0 * qp.xx - 2.0 * qp.zz,
            2.0 * (qp.yz - qp.wx),
        ],
        [
            2.0 * (qp.xz - qp.wy),
            2.0 * (qp.yz + qp.wx),
            1.0 - 2.0 * qp.xx - 2.0 * qp.yy,
        ],
    ]
}

/// Build a unit quaternion from roll/pitch/yaw decidegrees using the
/// ZYX half-angle construction. Each axis is wrapped into `(-1800, 1800]`
/// and yaw is negated before use, matching the original firmware's
/// motor-offset and yaw-removal constructors.
pub fn from_euler(roll_decideg: i32, pitch_decideg: i32, yaw_decideg: i32) -> Quaternion {
    let wrap = |v: i32| if v > 1800 { v - 3600 } else { v };

    let roll = wrap(roll_decideg);
    let pitch = wrap(pitch_decideg);
    let yaw = wrap(yaw_decideg);

    let decideg_to_half_rad = |v: i32| (v as f32) * (PI / 1800.0) * 0.5;

    let (sin_roll, cos_roll) = decideg_to_half_rad(roll).sin_cos();
    let (sin_pitch, cos_pitch) = decideg_to_half_rad(pitch).sin_cos();
    let (sin_yaw, cos_yaw) = decideg_to_half_rad(-yaw).sin_cos();

    let w = cos_roll * cos_pitch * cos_yaw + sin_roll * sin_pitch * sin_yaw;
    let x = sin_roll * cos_pitch * cos_yaw - cos_roll * sin_pitch * sin_yaw;
    let y = cos_roll * sin_pitch * cos_yaw + sin_roll * cos_pitch * sin_yaw;
    let z = cos_roll * cos_pitch * sin_yaw - sin_roll * sin_pitch * cos_yaw;

    Quaternion::new(w, x, y, z).normalized()
}

/// Build a product cache directly from roll/pitch/yaw decidegrees
/// (the original's `imuComputeMotorQuatOffset` / `imuComputeQuaternionFromRPY`).
/// Populates the full cache, including the component copy.
pub fn products_from_euler(roll_decideg: i32, pitch_decideg: i32, yaw_decideg: i32) -> QuatProducts {
    products_of(from_euler(roll_decideg, pitch_decideg, yaw_decideg))
}

/// Strip the yaw component from a product cache in place, preserving
/// roll/pitch: `qp <- qp (x) from_euler(0, 0, yaw)`.
///
/// Mirrors `imuComputeRemoveYaw`, which only overwrites
/// `xx,yy,zz,xy,xz,yz,wx,wy,wz` and leaves `w,x,y,z` and `ww` holding
/// whatever was there beforehand. That is preserved here rather than
/// "fixed": callers must not rely on `w,x,y,z,ww` after this call.
pub fn remove_yaw(qp: &mut QuatProducts, yaw_decideg: i32) {
    let yaw_only = from_euler(0, 0, yaw_decideg);

    let a = (qp.w + qp.x) * (yaw_only.w + yaw_only.x);
    let b = (qp.z - qp.y) * (yaw_only.y - yaw_only.z);
    let c = (qp.w - qp.x) * (yaw_only.y + yaw_only.z);
    let d = (qp.y + qp.z) * (yaw_only.w - yaw_only.x);
    let e = (qp.x + qp.z) * (yaw_only.x + yaw_only.y);
    let f = (qp.x - qp.z) * (yaw_only.x - yaw_only.y);
    let g = (qp.w + qp.y) * (yaw_only.w - yaw_only.z);
    let h = (qp.w - qp.y) * (yaw_only.w + yaw_only.z);

    let w = b + (-e - f + g + h) / 2.0;
    let x = a - (e + f + g + h) / 2.0;
    let y = c + (e - f + g - h) / 2.0;
    let z = d + (e - f - g + h) / 2.0;

    let recip_norm = fast_inv_sqrt(w * w + x * x + y * y + z * z);
    let w = w * recip_norm;
    let x = x * recip_norm;
    let y = y * recip_norm;
    let z = z * recip_norm;

    qp.xy = x * y;
    qp.xz = x * z;
    qp.yz = y * z;
    qp.wx = w * x;
    qp.wy = w * y;
    qp.wz = w * z;
    qp.xx = x * x;
    qp.yy = y * y;
    qp.zz = z * z;
}

/// `(pi/2 - acos(v)) * 1800/pi`, the decidegree extraction used for both
/// the primary Euler roll/pitch and the per-motor pitch/roll terms.
pub fn acos_complement_to_decideg(v: f32) -> i32 {
    ((PI / 2.0 - v.clamp(-1.0, 1.0).acos()) * (1800.0 / PI)).round() as i32
}

/// `-atan2(y, x) * 1800/pi` normalized to `[0, 3600)`, the yaw extraction.
pub fn atan2_to_wrapped_decideg(y: f32, x: f32) -> i32 {
    let mut yaw = (-y.atan2(x) * (1800.0 / PI)).round() as i32;
    if yaw < 0 {
        yaw += 3600;
    }
    yaw
}
