use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{PlatformError, PlatformResult};
use crate::geometry::SIDEREAL_DEGREES_PER_SECOND;

pub const DEFAULT_STROKE_DEGREES: f64 = 22.0;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrackingStateKind {
    AtStart,
    Tracking,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlatformAction {
    Start,
    Pause,
    Resume,
    Reset,
}

impl PlatformAction {
    pub const ALL: [PlatformAction; 4] = [
        PlatformAction::Start,
        PlatformAction::Pause,
        PlatformAction::Resume,
        PlatformAction::Reset,
    ];
}

/// Where the platform is in its stroke.
///
/// `Tracking` accumulates on top of `carried`, the time already spent
/// tracking before the last resume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackingState {
    AtStart,
    Tracking {
        started_at: Duration,
        carried: Duration,
        start_ra: f64,
        start_dec: f64,
    },
    Stopped {
        elapsed: Duration,
    },
}

impl TrackingState {
    pub fn kind(&self) -> TrackingStateKind {
        match self {
            TrackingState::AtStart => TrackingStateKind::AtStart,
            TrackingState::Tracking { .. } => TrackingStateKind::Tracking,
            TrackingState::Stopped { .. } => TrackingStateKind::Stopped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformConfig {
    stroke_degrees: f64,
}

impl PlatformConfig {
    pub fn new(stroke_degrees: f64) -> PlatformResult<Self> {
        if !stroke_degrees.is_finite() || stroke_degrees <= 0.0 {
            return Err(PlatformError::ConfigurationMissing(format!(
                "stroke_degrees must be positive, got {}",
                stroke_degrees
            )));
        }
        Ok(Self { stroke_degrees })
    }

    pub fn from_stroke_seconds(stroke_seconds: f64) -> PlatformResult<Self> {
        Self::new(stroke_seconds * SIDEREAL_DEGREES_PER_SECOND)
    }

    pub fn stroke_degrees(&self) -> f64 {
        self.stroke_degrees
    }

    pub fn stroke_seconds(&self) -> f64 {
        self.stroke_degrees / SIDEREAL_DEGREES_PER_SECOND
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            stroke_degrees: DEFAULT_STROKE_DEGREES,
        }
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct PlatformStatus {
    pub state: TrackingStateKind,
    pub stroke_degrees: f64,
    pub stroke_seconds: f64,
    pub elapsed_seconds: f64,
    pub time_remaining_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_ra: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_dec: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for PlatformStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Platform state = {}", self.state)?;
        match (self.frozen_ra, self.frozen_dec) {
            (Some(ra), Some(dec)) => write!(f, " RA = {:.4} Dec = {:.3}", ra, dec)?,
            _ => write!(f, " RA = ? Dec = ?")?,
        }
        write!(
            f,
            " Elapsed = {:.1} Rem = {:.1}",
            self.elapsed_seconds, self.time_remaining_seconds
        )
    }
}
