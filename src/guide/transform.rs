//! Maps corrections for the virtual equatorial mount onto the platform.
//!
//! Both frames are compared through the apparent motion of the target in
//! the horizon frame. Each axis, virtual or physical, moves the pointing
//! along some tangent direction at the target; those directions form the
//! columns of two 2×2 Jacobians over `(Δalt, cos(alt)·Δaz)`:
//!
//! * virtual RA, East positive: rotation about the pole, `p × v`
//! * virtual Dec, North positive: `(p − sin δ·v) / cos δ`
//! * platform tilt, East positive (deck retarded): also `p × v`
//! * mount altitude axis, North positive: the mount zenith, which the deck
//!   carries around the pole, projected onto the tangent plane
//!
//! The physical durations are `J_phys⁻¹ · J_virt · requested`. Everything is
//! evaluated at one instant and thrown away afterwards.

use serde::Serialize;

use super::types::{GuideRequest, PhysicalCorrection};
use crate::geometry::{
    cross, dot, equatorial_to_horizontal, mount_zenith, pole_axis, tangent_basis, SkyPosition,
};

/// Below this sine of the angle between the physical columns the system is
/// treated as singular.
pub const SINGULAR_SIN_THRESHOLD: f64 = 1e-2;
const MIN_LEVERAGE: f64 = 1e-9;
/// Cosine below which the target counts as sitting on the pole (or the
/// mount zenith) and the axis direction there is undefined.
const POLE_GUARD: f64 = 1e-3;

/// Inputs for one transform, sampled together under the platform lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideGeometry {
    pub latitude_deg: f64,
    pub lst_hours: f64,
    pub ra_hours: f64,
    pub dec_deg: f64,
    /// Deck tilt; zero is level.
    pub tilt_deg: f64,
}

impl GuideGeometry {
    pub fn sky_position(&self) -> SkyPosition {
        equatorial_to_horizontal(self.latitude_deg, self.lst_hours, self.ra_hours, self.dec_deg)
    }
}

/// Tangent-plane direction each axis moves the target per radian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisColumns {
    pub virtual_ra: [f64; 2],
    pub virtual_dec: [f64; 2],
    pub tilt: [f64; 2],
    pub mount: [f64; 2],
}

impl AxisColumns {
    pub fn at(geometry: &GuideGeometry) -> Self {
        let sky = geometry.sky_position();
        let v = sky.unit_vector();
        let p = pole_axis(geometry.latitude_deg);
        let basis = tangent_basis(sky.altitude_deg, sky.azimuth_deg);

        let eastward = basis.project(cross(p, v));

        let sin_dec = dot(p, v);
        let cos_dec = (1.0 - sin_dec * sin_dec).max(0.0).sqrt();
        let virtual_dec = if cos_dec < POLE_GUARD {
            [0.0, 0.0]
        } else {
            basis.project([
                (p[0] - sin_dec * v[0]) / cos_dec,
                (p[1] - sin_dec * v[1]) / cos_dec,
                (p[2] - sin_dec * v[2]) / cos_dec,
            ])
        };

        let zenith = mount_zenith(geometry.latitude_deg, geometry.tilt_deg);
        let z_dot_v = dot(zenith, v);
        let cos_mount_alt = (1.0 - z_dot_v * z_dot_v).max(0.0).sqrt();
        let mount = if cos_mount_alt < POLE_GUARD {
            [0.0, 0.0]
        } else {
            basis.project([
                (zenith[0] - z_dot_v * v[0]) / cos_mount_alt,
                (zenith[1] - z_dot_v * v[1]) / cos_mount_alt,
                (zenith[2] - z_dot_v * v[2]) / cos_mount_alt,
            ])
        };

        Self {
            virtual_ra: eastward,
            virtual_dec,
            tilt: eastward,
            mount,
        }
    }
}

/// Linear map from a virtual (RA, Dec) move to a physical (tilt, mount) move.
///
/// `k_rd` is the tilt contributed per unit of Dec request, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, utoipa::ToSchema)]
pub struct CorrectionFactors {
    pub k_rr: f64,
    pub k_rd: f64,
    pub k_dr: f64,
    pub k_dd: f64,
    /// One physical axis had no leverage and contributes nothing.
    pub singular: bool,
}

impl CorrectionFactors {
    pub fn from_columns(columns: &AxisColumns) -> Self {
        let [t0, t1] = columns.tilt;
        let [m0, m1] = columns.mount;
        let [r0, r1] = columns.virtual_ra;
        let [d0, d1] = columns.virtual_dec;

        let tilt_norm = t0.hypot(t1);
        let mount_norm = m0.hypot(m1);
        let det = t0 * m1 - m0 * t1;

        if tilt_norm < MIN_LEVERAGE
            || mount_norm < MIN_LEVERAGE
            || det.abs() < SINGULAR_SIN_THRESHOLD * tilt_norm * mount_norm
        {
            return Self::projected(columns, tilt_norm >= mount_norm);
        }

        Self {
            k_rr: (m1 * r0 - m0 * r1) / det,
            k_rd: (m1 * d0 - m0 * d1) / det,
            k_dr: (t0 * r1 - t1 * r0) / det,
            k_dd: (t0 * d1 - t1 * d0) / det,
            singular: false,
        }
    }

    /// Least-squares fit onto the one physical axis with leverage.
    fn projected(columns: &AxisColumns, use_tilt: bool) -> Self {
        let axis = if use_tilt {
            columns.tilt
        } else {
            columns.mount
        };
        let norm_sq = axis[0] * axis[0] + axis[1] * axis[1];
        let (on_ra, on_dec) = if norm_sq < MIN_LEVERAGE * MIN_LEVERAGE {
            (0.0, 0.0)
        } else {
            (
                (axis[0] * columns.virtual_ra[0] + axis[1] * columns.virtual_ra[1]) / norm_sq,
                (axis[0] * columns.virtual_dec[0] + axis[1] * columns.virtual_dec[1]) / norm_sq,
            )
        };

        if use_tilt {
            Self {
                k_rr: on_ra,
                k_rd: on_dec,
                k_dr: 0.0,
                k_dd: 0.0,
                singular: true,
            }
        } else {
            Self {
                k_rr: 0.0,
                k_rd: 0.0,
                k_dr: on_ra,
                k_dd: on_dec,
                singular: true,
            }
        }
    }

    pub fn at(geometry: &GuideGeometry) -> Self {
        Self::from_columns(&AxisColumns::at(geometry))
    }

    /// Returns `(tilt_ms, mount_ms)`.
    pub fn apply(&self, ra_ms: f64, dec_ms: f64) -> (f64, f64) {
        (
            self.k_rr * ra_ms + self.k_rd * dec_ms,
            self.k_dr * ra_ms + self.k_dd * dec_ms,
        )
    }
}

/// Scales both durations by the same factor so neither exceeds `max_ms`.
pub fn clamp_proportional(tilt_ms: f64, mount_ms: f64, max_ms: f64) -> (f64, f64) {
    let largest = tilt_ms.abs().max(mount_ms.abs());
    if largest <= max_ms || largest == 0.0 {
        return (tilt_ms, mount_ms);
    }
    let scale = max_ms / largest;
    (tilt_ms * scale, mount_ms * scale)
}

#[derive(Debug, Clone, Copy)]
pub struct GuidePulseTransform {
    max_pulse_ms: u32,
}

impl GuidePulseTransform {
    pub fn new(max_pulse_ms: u32) -> Self {
        Self { max_pulse_ms }
    }

    pub fn max_pulse_ms(&self) -> u32 {
        self.max_pulse_ms
    }

    pub fn factors(&self, geometry: &GuideGeometry) -> CorrectionFactors {
        CorrectionFactors::at(geometry)
    }

    pub fn transform(&self, request: GuideRequest, geometry: &GuideGeometry) -> PhysicalCorrection {
        let factors = self.factors(geometry);
        if factors.singular {
            log::warn!(
                "Degenerate guide geometry at RA {:.4} Dec {:.3} tilt {:.2}, one axis idle",
                geometry.ra_hours,
                geometry.dec_deg,
                geometry.tilt_deg
            );
        }

        let (ra_ms, dec_ms) = (request.ra_ms(), request.dec_ms());
        let (raw_tilt, raw_mount) = factors.apply(ra_ms, dec_ms);
        let (tilt_ms, mount_ms) =
            clamp_proportional(raw_tilt, raw_mount, f64::from(self.max_pulse_ms));

        log::debug!(
            "Transform input ra={:.1} ms dec={:.1} ms, factors {:?}, output tilt={:.1} ms mount={:.1} ms",
            ra_ms,
            dec_ms,
            factors,
            tilt_ms,
            mount_ms
        );

        PhysicalCorrection { tilt_ms, mount_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{
        horizontal_from_vector, platform_to_horizon, unit_vector, SIDEREAL_DEGREES_PER_SECOND,
    };
    use crate::guide::{GuideDirection, GuideRequest};

    const STEP_RAD: f64 = 1e-6;

    fn meridian_45() -> GuideGeometry {
        // Latitude 34, Dec -11 culminates at altitude 45
        GuideGeometry {
            latitude_deg: 34.0,
            lst_hours: 10.0,
            ra_hours: 10.0,
            dec_deg: -11.0,
            tilt_deg: 0.0,
        }
    }

    fn tangent_delta(before: (f64, f64), after: (f64, f64)) -> [f64; 2] {
        let (alt0, az0) = before;
        let (alt1, az1) = after;
        let daz = (az1 - az0 + 540.0).rem_euclid(360.0) - 180.0;
        [
            (alt1 - alt0).to_radians() / STEP_RAD,
            daz.to_radians() * alt0.to_radians().cos() / STEP_RAD,
        ]
    }

    /// Perturbs each axis through the forward functions alone.
    fn numeric_columns(g: &GuideGeometry) -> AxisColumns {
        let sky = g.sky_position();
        let here = (sky.altitude_deg, sky.azimuth_deg);
        let at = |ra: f64, dec: f64| {
            let s = equatorial_to_horizontal(g.latitude_deg, g.lst_hours, ra, dec);
            (s.altitude_deg, s.azimuth_deg)
        };

        let virtual_ra = tangent_delta(here, at(g.ra_hours + STEP_RAD.to_degrees() / 15.0, g.dec_deg));
        let virtual_dec = tangent_delta(here, at(g.ra_hours, g.dec_deg + STEP_RAD.to_degrees()));

        let v = sky.unit_vector();
        let tilt = tangent_delta(
            here,
            horizontal_from_vector(platform_to_horizon(v, g.latitude_deg, -STEP_RAD.to_degrees())),
        );

        let on_deck = platform_to_horizon(v, g.latitude_deg, -g.tilt_deg);
        let (mount_alt, mount_az) = horizontal_from_vector(on_deck);
        let raised = unit_vector(mount_alt + STEP_RAD.to_degrees(), mount_az);
        let mount = tangent_delta(
            here,
            horizontal_from_vector(platform_to_horizon(raised, g.latitude_deg, g.tilt_deg)),
        );

        AxisColumns {
            virtual_ra,
            virtual_dec,
            tilt,
            mount,
        }
    }

    fn assert_close(a: [f64; 2], b: [f64; 2], tol: f64) {
        assert!(
            (a[0] - b[0]).abs() < tol && (a[1] - b[1]).abs() < tol,
            "{:?} != {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_analytic_columns_match_numeric_perturbation() {
        let cases = [
            meridian_45(),
            GuideGeometry {
                latitude_deg: 34.0,
                lst_hours: 12.3,
                ra_hours: 10.0,
                dec_deg: 20.0,
                tilt_deg: -11.0,
            },
            GuideGeometry {
                latitude_deg: 51.5,
                lst_hours: 2.0,
                ra_hours: 5.5,
                dec_deg: 45.0,
                tilt_deg: 7.5,
            },
            GuideGeometry {
                latitude_deg: -30.0,
                lst_hours: 18.0,
                ra_hours: 16.5,
                dec_deg: -60.0,
                tilt_deg: 3.0,
            },
        ];

        for g in cases {
            let analytic = AxisColumns::at(&g);
            let numeric = numeric_columns(&g);
            assert_close(analytic.virtual_ra, numeric.virtual_ra, 1e-4);
            assert_close(analytic.virtual_dec, numeric.virtual_dec, 1e-4);
            assert_close(analytic.tilt, numeric.tilt, 1e-4);
            assert_close(analytic.mount, numeric.mount, 1e-4);
        }
    }

    #[test]
    fn test_factors_reproduce_requested_motion() {
        let g = GuideGeometry {
            latitude_deg: 34.0,
            lst_hours: 13.0,
            ra_hours: 10.0,
            dec_deg: 20.0,
            tilt_deg: -11.0 + 3600.0 * SIDEREAL_DEGREES_PER_SECOND,
        };
        let columns = AxisColumns::at(&g);
        let k = CorrectionFactors::from_columns(&columns);
        assert!(!k.singular);

        for (ra, dec) in [(1.0, 0.0), (0.0, 1.0), (0.3, -0.7)] {
            let (tilt, mount) = k.apply(ra, dec);
            let physical = [
                columns.tilt[0] * tilt + columns.mount[0] * mount,
                columns.tilt[1] * tilt + columns.mount[1] * mount,
            ];
            let wanted = [
                columns.virtual_ra[0] * ra + columns.virtual_dec[0] * dec,
                columns.virtual_ra[1] * ra + columns.virtual_dec[1] * dec,
            ];
            assert_close(physical, wanted, 1e-12);
        }
    }

    #[test]
    fn test_ra_requests_drive_only_the_platform() {
        let k = CorrectionFactors::at(&GuideGeometry {
            latitude_deg: 34.0,
            lst_hours: 14.0,
            ra_hours: 10.0,
            dec_deg: 20.0,
            tilt_deg: -5.0,
        });
        assert!((k.k_rr - 1.0).abs() < 1e-9);
        assert!(k.k_dr.abs() < 1e-9);
    }

    #[test]
    fn test_meridian_level_deck_is_identity() {
        let k = CorrectionFactors::at(&meridian_45());
        assert!((k.k_rr - 1.0).abs() < 1e-9);
        assert!(k.k_rd.abs() < 1e-9);
        assert!(k.k_dr.abs() < 1e-9);
        assert!((k.k_dd - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_meridian_pulses_keep_direction() {
        let transform = GuidePulseTransform::new(2500);
        for tilt_deg in [-11.0, 0.0, 11.0] {
            let g = GuideGeometry {
                tilt_deg,
                ..meridian_45()
            };

            let east = transform.transform(GuideRequest::from_direction(GuideDirection::East, 1000), &g);
            let east_pulse = east.tilt_pulse().unwrap();
            assert_eq!(east_pulse.direction, GuideDirection::East);
            assert!(east_pulse.duration_ms <= 2500);
            assert!(east.mount_pulse().is_none());

            let west = transform.transform(GuideRequest::from_direction(GuideDirection::West, 1000), &g);
            assert_eq!(west.tilt_pulse().unwrap().direction, GuideDirection::West);

            let north = transform.transform(GuideRequest::from_direction(GuideDirection::North, 1000), &g);
            let north_pulse = north.mount_pulse().unwrap();
            assert_eq!(north_pulse.direction, GuideDirection::North);
            assert!(north_pulse.duration_ms <= 2500);

            let south = transform.transform(GuideRequest::from_direction(GuideDirection::South, 1000), &g);
            assert_eq!(south.mount_pulse().unwrap().direction, GuideDirection::South);
        }
    }

    #[test]
    fn test_level_meridian_oracle() {
        let transform = GuidePulseTransform::new(2500);
        let g = meridian_45();

        let east = transform.transform(GuideRequest::from_direction(GuideDirection::East, 750), &g);
        assert!((east.tilt_ms - 750.0).abs() < 1e-6);
        assert!(east.mount_ms.abs() < 1e-6);

        let north = transform.transform(GuideRequest::from_direction(GuideDirection::North, 750), &g);
        assert!(north.tilt_ms.abs() < 1e-6);
        assert!((north.mount_ms - 750.0).abs() < 1e-6);
    }

    #[test]
    fn test_tilted_deck_couples_dec_into_tilt() {
        let k = CorrectionFactors::at(&GuideGeometry {
            tilt_deg: -11.0,
            ..meridian_45()
        });
        assert!(!k.singular);
        assert!(k.k_rd.abs() > 1e-3);
        assert!(k.k_dd > 0.5);
    }

    #[test]
    fn test_zenith_on_level_deck_is_singular() {
        // Dec equal to latitude culminates at the zenith
        let g = GuideGeometry {
            latitude_deg: 34.0,
            lst_hours: 10.0,
            ra_hours: 10.0,
            dec_deg: 34.0,
            tilt_deg: 0.0,
        };
        let k = CorrectionFactors::at(&g);
        assert!(k.singular);
        assert_eq!(k.k_dr, 0.0);
        assert_eq!(k.k_dd, 0.0);

        let transform = GuidePulseTransform::new(2500);
        let north = transform.transform(GuideRequest::from_direction(GuideDirection::North, 500), &g);
        assert!(north.tilt_ms.is_finite());
        assert_eq!(north.mount_ms, 0.0);
    }

    #[test]
    fn test_pole_target_stays_bounded() {
        let g = GuideGeometry {
            latitude_deg: 34.0,
            lst_hours: 3.0,
            ra_hours: 0.0,
            dec_deg: 90.0,
            tilt_deg: -4.0,
        };
        let transform = GuidePulseTransform::new(2000);
        for direction in [
            GuideDirection::North,
            GuideDirection::South,
            GuideDirection::East,
            GuideDirection::West,
        ] {
            let out = transform.transform(GuideRequest::from_direction(direction, 1000), &g);
            assert!(out.tilt_ms.is_finite() && out.mount_ms.is_finite());
            assert!(out.tilt_ms.abs() <= 2000.0 && out.mount_ms.abs() <= 2000.0);
        }
    }

    #[test]
    fn test_clamp_preserves_ratio() {
        let (tilt, mount) = clamp_proportional(4000.0, -1500.0, 2000.0);
        assert!((tilt - 2000.0).abs() < 1e-9);
        assert!((mount + 750.0).abs() < 1e-9);
        let before = 4000.0 / -1500.0;
        let after = tilt / mount;
        assert!(((after - before) / before).abs() < 0.01);

        assert_eq!(clamp_proportional(300.0, 200.0, 2000.0), (300.0, 200.0));
        assert_eq!(clamp_proportional(0.0, 0.0, 2000.0), (0.0, 0.0));
    }

    #[test]
    fn test_large_request_is_scaled_not_truncated() {
        let g = GuideGeometry {
            latitude_deg: 34.0,
            lst_hours: 13.0,
            ra_hours: 10.0,
            dec_deg: 20.0,
            tilt_deg: -11.0,
        };
        let transform = GuidePulseTransform::new(2000);
        let k = transform.factors(&g);
        let (raw_tilt, raw_mount) = k.apply(0.0, 9000.0);
        let out = transform.transform(GuideRequest::from_direction(GuideDirection::North, 9000), &g);

        assert!(out.tilt_ms.abs().max(out.mount_ms.abs()) <= 2000.0 + 1e-9);
        let before = raw_tilt / raw_mount;
        let after = out.tilt_ms / out.mount_ms;
        assert!(((after - before) / before).abs() < 0.01);
    }
}
