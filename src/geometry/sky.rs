use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::frame::Vec3;

pub const SIDEREAL_DAY_SECONDS: f64 = (23.0 * 60.0 + 56.0) * 60.0 + 4.0905;
pub const SIDEREAL_DEGREES_PER_SECOND: f64 = 360.0 / SIDEREAL_DAY_SECONDS;

const J2000_JULIAN_DAY: f64 = 2_451_545.0;
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Site {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

/// Topocentric view of an equatorial position at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, utoipa::ToSchema)]
pub struct SkyPosition {
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub altitude_deg: f64,
    pub azimuth_deg: f64,
    pub hour_angle_deg: f64,
}

impl SkyPosition {
    pub fn ra_hours(&self) -> f64 {
        self.ra_deg / 15.0
    }

    pub fn unit_vector(&self) -> Vec3 {
        unit_vector(self.altitude_deg, self.azimuth_deg)
    }
}

/// Wraps `value` into `[start, end)`.
pub fn norm(value: f64, start: f64, end: f64) -> f64 {
    let range = end - start;
    let offset = value - start;
    value - (offset / range).floor() * range
}

pub fn norm_ra(hours: f64) -> f64 {
    norm(hours, 0.0, 24.0)
}

/// Hour angle in hours, wrapped into `[-12, 12)`.
pub fn hour_angle_hours(lst_hours: f64, ra_hours: f64) -> f64 {
    norm(lst_hours - ra_hours, -12.0, 12.0)
}

pub fn equatorial_to_horizontal(
    latitude_deg: f64,
    lst_hours: f64,
    ra_hours: f64,
    dec_deg: f64,
) -> SkyPosition {
    let ha_deg = hour_angle_hours(lst_hours, ra_hours) * 15.0;
    let lat = latitude_deg.to_radians();
    let dec = dec_deg.to_radians();
    let ha = ha_deg.to_radians();

    let sin_alt = (lat.sin() * dec.sin() + lat.cos() * dec.cos() * ha.cos()).clamp(-1.0, 1.0);
    let altitude = sin_alt.asin();

    let east = -dec.cos() * ha.sin();
    let north = dec.sin() * lat.cos() - dec.cos() * ha.cos() * lat.sin();
    let azimuth = east.atan2(north).to_degrees().rem_euclid(360.0);

    SkyPosition {
        ra_deg: norm_ra(ra_hours) * 15.0,
        dec_deg,
        altitude_deg: altitude.to_degrees(),
        azimuth_deg: azimuth,
        hour_angle_deg: ha_deg,
    }
}

/// Inverse of [`equatorial_to_horizontal`]; returns `(ra_hours, dec_deg)`.
pub fn horizontal_to_equatorial(
    latitude_deg: f64,
    lst_hours: f64,
    azimuth_deg: f64,
    altitude_deg: f64,
) -> (f64, f64) {
    let lat = latitude_deg.to_radians();
    let alt = altitude_deg.to_radians();
    let az = azimuth_deg.to_radians();

    let sin_dec = (lat.sin() * alt.sin() + lat.cos() * alt.cos() * az.cos()).clamp(-1.0, 1.0);
    let dec = sin_dec.asin();

    let y = -az.sin() * alt.cos();
    let x = alt.sin() * lat.cos() - alt.cos() * az.cos() * lat.sin();
    let ha_hours = y.atan2(x).to_degrees() / 15.0;

    (norm_ra(lst_hours - ha_hours), dec.to_degrees())
}

/// East-north-up unit vector for a horizontal position.
pub fn unit_vector(altitude_deg: f64, azimuth_deg: f64) -> Vec3 {
    let alt = altitude_deg.to_radians();
    let az = azimuth_deg.to_radians();
    [alt.cos() * az.sin(), alt.cos() * az.cos(), alt.sin()]
}

/// Returns `(altitude_deg, azimuth_deg)` of an east-north-up direction.
pub fn horizontal_from_vector(v: Vec3) -> (f64, f64) {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len == 0.0 {
        return (0.0, 0.0);
    }
    let altitude = (v[2] / len).clamp(-1.0, 1.0).asin().to_degrees();
    let azimuth = v[0].atan2(v[1]).to_degrees().rem_euclid(360.0);
    (altitude, azimuth)
}

/// Greenwich mean sidereal time in hours.
pub fn greenwich_sidereal_time(utc: DateTime<Utc>) -> f64 {
    let unix_days = utc.timestamp() as f64 / 86_400.0
        + f64::from(utc.timestamp_subsec_nanos()) / 86_400.0e9;
    let days = unix_days + UNIX_EPOCH_JULIAN_DAY - J2000_JULIAN_DAY;
    norm_ra(18.697_374_558 + 24.065_709_824_419_08 * days)
}

pub fn local_sidereal_time(utc: DateTime<Utc>, longitude_deg: f64) -> f64 {
    norm_ra(greenwich_sidereal_time(utc) + longitude_deg / 15.0)
}
