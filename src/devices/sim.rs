//! In-process rig used by the `serve` backend and by tests.
//!
//! Every simulated device keeps its state behind an `Arc<Mutex<_>>`; clones
//! share that state so a caller can hand one clone to the adapter and keep
//! another to observe what the adapter did.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;

use super::{DeviceError, Mount, PlatformMotor, PulseGuidePort};
use crate::geometry::{local_sidereal_time, Site};
use crate::guide::GuideDirection;
use crate::platform::Clock;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct MountState {
    pub site: Site,
    pub ra_hours: f64,
    pub dec_deg: f64,
    pub tracking: bool,
    pub connected: bool,
    /// Fixed sidereal time; `None` follows the wall clock.
    pub sidereal_time: Option<f64>,
    pub syncs: Vec<(f64, f64)>,
    pub tracking_changes: Vec<bool>,
}

#[derive(Debug, Clone)]
pub struct SimulatedMount {
    state: Arc<Mutex<MountState>>,
}

impl SimulatedMount {
    pub fn new(site: Site, ra_hours: f64, dec_deg: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MountState {
                site,
                ra_hours,
                dec_deg,
                tracking: true,
                connected: false,
                sidereal_time: None,
                syncs: Vec::new(),
                tracking_changes: Vec::new(),
            })),
        }
    }

    pub fn with_sidereal_time(self, lst_hours: f64) -> Self {
        locked(&self.state).sidereal_time = Some(lst_hours);
        self
    }

    pub fn state(&self) -> MountState {
        locked(&self.state).clone()
    }

    /// Moves the telescope as a hand slew would.
    pub fn slew(&self, ra_hours: f64, dec_deg: f64) {
        let mut state = locked(&self.state);
        state.ra_hours = ra_hours;
        state.dec_deg = dec_deg;
    }

    pub fn set_sidereal_time(&self, lst_hours: f64) {
        locked(&self.state).sidereal_time = Some(lst_hours);
    }

    fn connected(&self) -> Result<MutexGuard<'_, MountState>, DeviceError> {
        let state = locked(&self.state);
        if state.connected {
            Ok(state)
        } else {
            Err(DeviceError::NotConnected)
        }
    }
}

impl Mount for SimulatedMount {
    fn set_connected(&mut self, connected: bool) -> Result<(), DeviceError> {
        locked(&self.state).connected = connected;
        Ok(())
    }

    fn site_latitude(&self) -> Result<f64, DeviceError> {
        Ok(self.connected()?.site.latitude_deg)
    }

    fn site_longitude(&self) -> Result<f64, DeviceError> {
        Ok(self.connected()?.site.longitude_deg)
    }

    fn sidereal_time(&self) -> Result<f64, DeviceError> {
        let state = self.connected()?;
        Ok(state
            .sidereal_time
            .unwrap_or_else(|| local_sidereal_time(Utc::now(), state.site.longitude_deg)))
    }

    fn right_ascension(&self) -> Result<f64, DeviceError> {
        Ok(self.connected()?.ra_hours)
    }

    fn declination(&self) -> Result<f64, DeviceError> {
        Ok(self.connected()?.dec_deg)
    }

    fn sync_to_coordinates(&mut self, ra_hours: f64, dec_deg: f64) -> Result<(), DeviceError> {
        let mut state = self.connected()?;
        state.ra_hours = ra_hours;
        state.dec_deg = dec_deg;
        state.syncs.push((ra_hours, dec_deg));
        Ok(())
    }

    fn set_tracking(&mut self, tracking: bool) -> Result<(), DeviceError> {
        let mut state = self.connected()?;
        state.tracking = tracking;
        state.tracking_changes.push(tracking);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortState {
    pub connected: bool,
    pub can_pulse_guide: bool,
    /// Never report completion, as a wedged driver would.
    pub stuck: bool,
    pub pulses: Vec<(GuideDirection, u32)>,
    busy_until: Option<Duration>,
}

#[derive(Clone)]
pub struct SimulatedGuidePort {
    state: Arc<Mutex<PortState>>,
    clock: Arc<dyn Clock>,
}

impl SimulatedGuidePort {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PortState {
                can_pulse_guide: true,
                ..PortState::default()
            })),
            clock,
        }
    }

    pub fn state(&self) -> PortState {
        locked(&self.state).clone()
    }

    pub fn set_stuck(&self, stuck: bool) {
        locked(&self.state).stuck = stuck;
    }

    pub fn set_can_pulse_guide(&self, can_pulse_guide: bool) {
        locked(&self.state).can_pulse_guide = can_pulse_guide;
    }
}

impl PulseGuidePort for SimulatedGuidePort {
    fn set_connected(&mut self, connected: bool) -> Result<(), DeviceError> {
        locked(&self.state).connected = connected;
        Ok(())
    }

    fn can_pulse_guide(&self) -> Result<bool, DeviceError> {
        Ok(locked(&self.state).can_pulse_guide)
    }

    fn pulse_guide(
        &mut self,
        direction: GuideDirection,
        duration_ms: u32,
    ) -> Result<(), DeviceError> {
        let now = self.clock.now();
        let mut state = locked(&self.state);
        if !state.connected {
            return Err(DeviceError::NotConnected);
        }
        state.pulses.push((direction, duration_ms));
        state.busy_until = Some(now + Duration::from_millis(u64::from(duration_ms)));
        Ok(())
    }

    fn is_guiding(&self) -> Result<bool, DeviceError> {
        let now = self.clock.now();
        let state = locked(&self.state);
        if !state.connected {
            return Err(DeviceError::NotConnected);
        }
        Ok(state.stuck || state.busy_until.is_some_and(|until| now < until))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MotorState {
    pub connected: bool,
    pub engaged: bool,
    pub history: Vec<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedMotor {
    state: Arc<Mutex<MotorState>>,
}

impl SimulatedMotor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MotorState {
        locked(&self.state).clone()
    }
}

impl PlatformMotor for SimulatedMotor {
    fn set_connected(&mut self, connected: bool) -> Result<(), DeviceError> {
        locked(&self.state).connected = connected;
        Ok(())
    }

    fn set_engaged(&mut self, engaged: bool) -> Result<(), DeviceError> {
        let mut state = locked(&self.state);
        if !state.connected {
            return Err(DeviceError::NotConnected);
        }
        state.engaged = engaged;
        state.history.push(engaged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ManualClock;

    fn site() -> Site {
        Site {
            latitude_deg: 34.0,
            longitude_deg: -118.0,
        }
    }

    #[test]
    fn test_mount_requires_connection() {
        let mut mount = SimulatedMount::new(site(), 10.0, 20.0);
        assert!(matches!(
            mount.right_ascension(),
            Err(DeviceError::NotConnected)
        ));

        mount.set_connected(true).unwrap();
        assert_eq!(mount.right_ascension().unwrap(), 10.0);
    }

    #[test]
    fn test_mount_clones_share_state() {
        let mut mount = SimulatedMount::new(site(), 10.0, 20.0).with_sidereal_time(4.5);
        let observer = mount.clone();
        mount.set_connected(true).unwrap();
        mount.sync_to_coordinates(9.0, 21.0).unwrap();

        let state = observer.state();
        assert_eq!(state.syncs, vec![(9.0, 21.0)]);
        assert_eq!(mount.sidereal_time().unwrap(), 4.5);
    }

    #[test]
    fn test_port_reports_guiding_for_pulse_duration() {
        let clock = Arc::new(ManualClock::new());
        let mut port = SimulatedGuidePort::new(clock.clone());
        port.set_connected(true).unwrap();

        port.pulse_guide(GuideDirection::East, 200).unwrap();
        assert!(port.is_guiding().unwrap());

        clock.advance(Duration::from_millis(199));
        assert!(port.is_guiding().unwrap());

        clock.advance(Duration::from_millis(1));
        assert!(!port.is_guiding().unwrap());
    }

    #[test]
    fn test_stuck_port_never_completes() {
        let clock = Arc::new(ManualClock::new());
        let mut port = SimulatedGuidePort::new(clock.clone());
        port.set_connected(true).unwrap();
        port.set_stuck(true);

        port.pulse_guide(GuideDirection::North, 10).unwrap();
        clock.advance(Duration::from_secs(60));
        assert!(port.is_guiding().unwrap());
    }

    #[test]
    fn test_motor_records_engagement() {
        let mut motor = SimulatedMotor::new();
        assert!(motor.set_engaged(true).is_err());

        motor.set_connected(true).unwrap();
        motor.set_engaged(true).unwrap();
        motor.set_engaged(false).unwrap();
        assert_eq!(motor.state().history, vec![true, false]);
    }
}
