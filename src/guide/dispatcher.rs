use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;

use super::types::{PhysicalCorrection, PhysicalPulse};
use crate::devices::PulseGuidePort;
use crate::platform::{Clock, PlatformError, PlatformResult, TrackingPlatform};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchSettings {
    pub poll_interval: Duration,
    /// Allowed on top of the pulse duration before a pulse counts as stuck.
    pub timeout_margin: Duration,
    /// Wait for the last pulse of a request too, instead of returning as
    /// soon as it is issued.
    pub wait_for_final_pulse: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            timeout_margin: Duration::from_millis(5000),
            wait_for_final_pulse: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct DispatchReport {
    pub correction: PhysicalCorrection,
    pub issued: Vec<PhysicalPulse>,
}

/// Marks a dispatch as in flight until dropped.
#[derive(Debug)]
pub struct DispatchGuard<'a> {
    in_flight: &'a AtomicBool,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Serialises physical pulses onto the one shared guide port.
#[derive(Debug, Default)]
pub struct PulseDispatcher {
    settings: DispatchSettings,
    in_flight: AtomicBool,
}

impl PulseDispatcher {
    pub fn new(settings: DispatchSettings) -> Self {
        Self {
            settings,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Claims the port for one request. A second request while the first is
    /// still out is refused rather than queued.
    pub fn begin(&self) -> PlatformResult<DispatchGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PlatformError::DispatchInFlight)?;
        Ok(DispatchGuard {
            in_flight: &self.in_flight,
        })
    }

    /// Issues the tilt pulse, then the mount pulse, each only when nonzero.
    ///
    /// Every pulse but the last is waited on until the port reports it done;
    /// a pulse still running after `timeout_margin` beyond its duration fails
    /// the request and nothing further is issued.
    pub fn dispatch(
        &self,
        _guard: &DispatchGuard<'_>,
        platform: &TrackingPlatform,
        correction: PhysicalCorrection,
        port: &mut dyn PulseGuidePort,
        clock: &dyn Clock,
    ) -> PlatformResult<DispatchReport> {
        if !platform.is_tracking() {
            return Err(PlatformError::NotTracking);
        }
        // An unwaited final pulse from the previous request may still be running
        if port.is_guiding()? {
            return Err(PlatformError::DispatchInFlight);
        }

        let pulses: Vec<PhysicalPulse> = correction.pulses().into_iter().flatten().collect();
        let mut issued = Vec::with_capacity(pulses.len());

        for (i, pulse) in pulses.iter().enumerate() {
            let is_last = i + 1 == pulses.len();

            log::debug!("Issuing {} pulse of {} ms", pulse.direction, pulse.duration_ms);
            port.pulse_guide(pulse.direction, pulse.duration_ms)?;
            issued.push(*pulse);

            if !is_last || self.settings.wait_for_final_pulse {
                self.wait_for_completion(pulse, port, clock)?;
            }
        }

        Ok(DispatchReport { correction, issued })
    }

    fn wait_for_completion(
        &self,
        pulse: &PhysicalPulse,
        port: &dyn PulseGuidePort,
        clock: &dyn Clock,
    ) -> PlatformResult<()> {
        let issued_at = clock.now();
        let pulse_duration = Duration::from_millis(u64::from(pulse.duration_ms));
        let limit = pulse_duration + self.settings.timeout_margin;

        // The port cannot finish before the pulse has run
        clock.sleep(pulse_duration);

        loop {
            if !port.is_guiding()? {
                return Ok(());
            }
            let waited = clock.now().saturating_sub(issued_at);
            if waited >= limit {
                log::error!(
                    "Timed out waiting for {} pulse of {} ms",
                    pulse.direction,
                    pulse.duration_ms
                );
                return Err(PlatformError::PulseTimeout {
                    direction: pulse.direction,
                    duration_ms: pulse.duration_ms,
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }
            clock.sleep(self.settings.poll_interval.min(limit - waited));
        }
    }
}
