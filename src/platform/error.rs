use thiserror::Error;

use super::types::{PlatformAction, TrackingStateKind};
use crate::devices::DeviceError;
use crate::guide::GuideDirection;
use crate::settings::SettingsError;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("cannot {action} while platform is {state}")]
    InvalidStateTransition {
        state: TrackingStateKind,
        action: PlatformAction,
    },
    #[error("platform is not tracking")]
    NotTracking,
    #[error("{direction} pulse of {duration_ms} ms not complete after {waited_ms} ms")]
    PulseTimeout {
        direction: GuideDirection,
        duration_ms: u32,
        waited_ms: u64,
    },
    #[error("a guide pulse is already in flight")]
    DispatchInFlight,
    #[error("missing configuration: {0}")]
    ConfigurationMissing(String),
    #[error("stroke can only be changed while the platform is at start")]
    StrokeLocked,
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}

pub type PlatformResult<T> = Result<T, PlatformError>;
