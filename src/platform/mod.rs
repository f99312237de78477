mod clock;
mod error;
mod platform;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PlatformError, PlatformResult};
pub use platform::{reset_sync_ra, TrackingPlatform};
pub use types::{
    PlatformAction, PlatformConfig, PlatformStatus, TrackingState, TrackingStateKind,
    DEFAULT_STROKE_DEGREES,
};
