use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    utoipa::ToSchema,
    strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GuideDirection {
    North,
    South,
    East,
    West,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideAxis {
    Ra,
    Dec,
}

impl GuideDirection {
    pub fn axis(&self) -> GuideAxis {
        match self {
            GuideDirection::East | GuideDirection::West => GuideAxis::Ra,
            GuideDirection::North | GuideDirection::South => GuideAxis::Dec,
        }
    }
}

/// One autoguider correction against the virtual equatorial mount.
/// East and North are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuideRequest {
    pub axis: GuideAxis,
    pub signed_duration_ms: i32,
}

impl GuideRequest {
    pub fn from_direction(direction: GuideDirection, duration_ms: u32) -> Self {
        let magnitude = i32::try_from(duration_ms).unwrap_or(i32::MAX);
        let signed_duration_ms = match direction {
            GuideDirection::East | GuideDirection::North => magnitude,
            GuideDirection::West | GuideDirection::South => -magnitude,
        };
        Self {
            axis: direction.axis(),
            signed_duration_ms,
        }
    }

    pub fn ra_ms(&self) -> f64 {
        match self.axis {
            GuideAxis::Ra => f64::from(self.signed_duration_ms),
            GuideAxis::Dec => 0.0,
        }
    }

    pub fn dec_ms(&self) -> f64 {
        match self.axis {
            GuideAxis::Ra => 0.0,
            GuideAxis::Dec => f64::from(self.signed_duration_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct PhysicalPulse {
    pub direction: GuideDirection,
    pub duration_ms: u32,
}

/// Signed pulse durations for the two physical axes, already clamped.
///
/// The tilt axis goes out on the East/West lines (East retards the platform),
/// the mount axis on North/South (North raises the mount's altitude axis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, utoipa::ToSchema)]
pub struct PhysicalCorrection {
    pub tilt_ms: f64,
    pub mount_ms: f64,
}

impl PhysicalCorrection {
    pub fn tilt_pulse(&self) -> Option<PhysicalPulse> {
        to_pulse(self.tilt_ms, GuideDirection::East, GuideDirection::West)
    }

    pub fn mount_pulse(&self) -> Option<PhysicalPulse> {
        to_pulse(self.mount_ms, GuideDirection::North, GuideDirection::South)
    }

    /// Pulses in issue order, tilt first.
    pub fn pulses(&self) -> [Option<PhysicalPulse>; 2] {
        [self.tilt_pulse(), self.mount_pulse()]
    }
}

fn to_pulse(
    signed_ms: f64,
    positive: GuideDirection,
    negative: GuideDirection,
) -> Option<PhysicalPulse> {
    let duration_ms = signed_ms.abs().round();
    if !duration_ms.is_finite() || duration_ms < 1.0 {
        return None;
    }
    Some(PhysicalPulse {
        direction: if signed_ms >= 0.0 { positive } else { negative },
        duration_ms: duration_ms.min(f64::from(u32::MAX)) as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_signs() {
        let east = GuideRequest::from_direction(GuideDirection::East, 300);
        assert_eq!(east.ra_ms(), 300.0);
        assert_eq!(east.dec_ms(), 0.0);

        let south = GuideRequest::from_direction(GuideDirection::South, 250);
        assert_eq!(south.axis, GuideAxis::Dec);
        assert_eq!(south.dec_ms(), -250.0);
        assert_eq!(south.ra_ms(), 0.0);
    }

    #[test]
    fn test_correction_to_pulses() {
        let correction = PhysicalCorrection {
            tilt_ms: -120.4,
            mount_ms: 80.6,
        };
        assert_eq!(
            correction.pulses(),
            [
                Some(PhysicalPulse {
                    direction: GuideDirection::West,
                    duration_ms: 120
                }),
                Some(PhysicalPulse {
                    direction: GuideDirection::North,
                    duration_ms: 81
                }),
            ]
        );
    }

    #[test]
    fn test_sub_millisecond_pulses_are_dropped() {
        let correction = PhysicalCorrection {
            tilt_ms: 0.4,
            mount_ms: -0.49,
        };
        assert_eq!(correction.pulses(), [None, None]);
    }

    #[test]
    fn test_direction_display() {
        assert_eq!(GuideDirection::West.to_string(), "west");
    }
}
