//! Vector helpers for the east-north-up horizon frame and the frame carried
//! by the tilting platform.

pub type Vec3 = [f64; 3];

pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Direction of the north celestial pole for an observer at `latitude_deg`.
pub fn pole_axis(latitude_deg: f64) -> Vec3 {
    let lat = latitude_deg.to_radians();
    [0.0, lat.cos(), lat.sin()]
}

/// Right-handed rotation of `v` about the unit vector `axis` (Rodrigues).
pub fn rotate_about(v: Vec3, axis: Vec3, angle_rad: f64) -> Vec3 {
    let (sin, cos) = angle_rad.sin_cos();
    let k_cross_v = cross(axis, v);
    let k_dot_v = dot(axis, v);
    [
        v[0] * cos + k_cross_v[0] * sin + axis[0] * k_dot_v * (1.0 - cos),
        v[1] * cos + k_cross_v[1] * sin + axis[1] * k_dot_v * (1.0 - cos),
        v[2] * cos + k_cross_v[2] * sin + axis[2] * k_dot_v * (1.0 - cos),
    ]
}

/// Maps a direction fixed to the platform deck into the horizon frame.
///
/// Positive tilt follows the stars westward, so it is a negative right-handed
/// rotation about the pole. Zero tilt is the level deck.
pub fn platform_to_horizon(v: Vec3, latitude_deg: f64, tilt_deg: f64) -> Vec3 {
    rotate_about(v, pole_axis(latitude_deg), -tilt_deg.to_radians())
}

/// Zenith of the mount riding on the platform, seen from the horizon frame.
pub fn mount_zenith(latitude_deg: f64, tilt_deg: f64) -> Vec3 {
    platform_to_horizon([0.0, 0.0, 1.0], latitude_deg, tilt_deg)
}

/// Orthonormal directions of increasing altitude and increasing azimuth at a
/// horizontal position.
#[derive(Debug, Clone, Copy)]
pub struct TangentBasis {
    pub altitude: Vec3,
    pub azimuth: Vec3,
}

impl TangentBasis {
    /// Components `(Δalt, cos(alt)·Δaz)` of a tangent vector, in radians.
    pub fn project(&self, d: Vec3) -> [f64; 2] {
        [dot(d, self.altitude), dot(d, self.azimuth)]
    }
}

pub fn tangent_basis(altitude_deg: f64, azimuth_deg: f64) -> TangentBasis {
    let alt = altitude_deg.to_radians();
    let az = azimuth_deg.to_radians();
    TangentBasis {
        altitude: [-alt.sin() * az.sin(), -alt.sin() * az.cos(), alt.cos()],
        azimuth: [az.cos(), -az.sin(), 0.0],
    }
}
