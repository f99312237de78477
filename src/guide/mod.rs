mod dispatcher;
mod transform;
mod types;

pub use dispatcher::{DispatchGuard, DispatchReport, DispatchSettings, PulseDispatcher};
pub use transform::{
    clamp_proportional, AxisColumns, CorrectionFactors, GuideGeometry, GuidePulseTransform,
    SINGULAR_SIN_THRESHOLD,
};
pub use types::{GuideAxis, GuideDirection, GuideRequest, PhysicalCorrection, PhysicalPulse};
