use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::clock::Clock;
use super::error::{PlatformError, PlatformResult};
use super::types::{
    PlatformAction, PlatformConfig, PlatformStatus, TrackingState, TrackingStateKind,
};
use crate::devices::Devices;
use crate::geometry::{norm_ra, SIDEREAL_DEGREES_PER_SECOND};

/// The equatorial platform's tracking state machine and stroke timer.
///
/// While tracking, the virtual mount reports the RA/Dec frozen at start;
/// the platform carries the alt-az mount so that position stays in view.
pub struct TrackingPlatform {
    config: PlatformConfig,
    state: TrackingState,
    clock: Arc<dyn Clock>,
}

impl TrackingPlatform {
    pub fn new(config: PlatformConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            state: TrackingState::AtStart,
            clock,
        }
    }

    /// Back to the start position with a fresh configuration and a zeroed timer.
    pub fn reinitialize(&mut self, config: PlatformConfig) {
        self.config = config;
        self.state = TrackingState::AtStart;
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn state_kind(&self) -> TrackingStateKind {
        self.state.kind()
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, TrackingState::Tracking { .. })
    }

    pub fn config(&self) -> PlatformConfig {
        self.config
    }

    pub fn set_config(&mut self, config: PlatformConfig) -> PlatformResult<()> {
        if self.state != TrackingState::AtStart {
            return Err(PlatformError::StrokeLocked);
        }
        self.config = config;
        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        match self.state {
            TrackingState::AtStart => Duration::ZERO,
            TrackingState::Tracking {
                started_at,
                carried,
                ..
            } => carried + self.clock.now().saturating_sub(started_at),
            TrackingState::Stopped { elapsed } => elapsed,
        }
    }

    pub fn time_remaining(&self) -> f64 {
        (self.config.stroke_seconds() - self.elapsed().as_secs_f64()).max(0.0)
    }

    /// Deck tilt in degrees; the deck is level at mid-stroke.
    pub fn tilt_degrees(&self) -> f64 {
        self.elapsed().as_secs_f64() * SIDEREAL_DEGREES_PER_SECOND
            - self.config.stroke_degrees() / 2.0
    }

    pub fn frozen_ra(&self) -> Option<f64> {
        match self.state {
            TrackingState::Tracking { start_ra, .. } => Some(start_ra),
            _ => None,
        }
    }

    pub fn frozen_dec(&self) -> Option<f64> {
        match self.state {
            TrackingState::Tracking { start_dec, .. } => Some(start_dec),
            _ => None,
        }
    }

    pub fn status(&self) -> PlatformStatus {
        PlatformStatus {
            state: self.state_kind(),
            stroke_degrees: self.config.stroke_degrees(),
            stroke_seconds: self.config.stroke_seconds(),
            elapsed_seconds: self.elapsed().as_secs_f64(),
            time_remaining_seconds: self.time_remaining(),
            frozen_ra: self.frozen_ra(),
            frozen_dec: self.frozen_dec(),
            timestamp: Utc::now(),
        }
    }

    pub fn apply(&mut self, action: PlatformAction, devices: &mut Devices) -> PlatformResult<()> {
        match action {
            PlatformAction::Start => self.start(devices),
            PlatformAction::Pause => self.pause(devices),
            PlatformAction::Resume => self.resume(devices),
            PlatformAction::Reset => self.reset(devices),
        }
    }

    pub fn start(&mut self, devices: &mut Devices) -> PlatformResult<()> {
        if self.state != TrackingState::AtStart {
            return Err(self.invalid(PlatformAction::Start));
        }
        self.begin_tracking(devices, Duration::ZERO)
    }

    pub fn resume(&mut self, devices: &mut Devices) -> PlatformResult<()> {
        let TrackingState::Stopped { elapsed } = self.state else {
            return Err(self.invalid(PlatformAction::Resume));
        };
        if self.time_remaining() <= 0.0 {
            log::warn!("Resuming with the stroke already exhausted");
        }
        // The mount was free to slew while paused, so the position is taken afresh.
        self.begin_tracking(devices, elapsed)
    }

    fn begin_tracking(&mut self, devices: &mut Devices, carried: Duration) -> PlatformResult<()> {
        let start_ra = devices.mount.right_ascension()?;
        let start_dec = devices.mount.declination()?;

        devices.mount.set_tracking(false)?;
        if let Err(e) = devices.engage_motor(true) {
            let _ = devices.mount.set_tracking(true);
            return Err(e.into());
        }

        self.state = TrackingState::Tracking {
            started_at: self.clock.now(),
            carried,
            start_ra,
            start_dec,
        };
        log::info!(
            "Platform tracking from RA {:.4} Dec {:.3}, {:.1}s remaining",
            start_ra,
            start_dec,
            self.time_remaining()
        );
        Ok(())
    }

    /// Stops the platform and hands tracking back to the mount. A no-op
    /// unless tracking.
    pub fn pause(&mut self, devices: &mut Devices) -> PlatformResult<()> {
        let TrackingState::Tracking {
            start_ra,
            start_dec,
            ..
        } = self.state
        else {
            return Ok(());
        };

        devices.engage_motor(false)?;
        let elapsed = self.elapsed();
        self.state = TrackingState::Stopped { elapsed };

        // RA and Dec held still while the platform tracked. The mount drive
        // comes back on even when the sync is refused.
        let synced = devices.mount.sync_to_coordinates(start_ra, start_dec);
        devices.mount.set_tracking(true)?;
        synced?;

        log::info!(
            "Platform paused after {:.1}s, {:.1}s remaining",
            elapsed.as_secs_f64(),
            self.time_remaining()
        );
        Ok(())
    }

    /// Returns the platform to its start position and re-syncs the mount for
    /// the hour angle the deck gives back.
    pub fn reset(&mut self, devices: &mut Devices) -> PlatformResult<()> {
        let (ra, dec) = match self.state {
            TrackingState::AtStart => return Ok(()),
            TrackingState::Stopped { .. } => (
                devices.mount.right_ascension()?,
                devices.mount.declination()?,
            ),
            TrackingState::Tracking {
                start_ra,
                start_dec,
                ..
            } => {
                devices.engage_motor(false)?;
                (start_ra, start_dec)
            }
        };

        let elapsed = self.elapsed();
        self.state = TrackingState::Stopped { elapsed };

        let target_ra = reset_sync_ra(ra, elapsed);
        devices.mount.set_tracking(false)?;
        let synced = devices.mount.sync_to_coordinates(target_ra, dec);
        devices.mount.set_tracking(true)?;
        synced?;

        self.state = TrackingState::AtStart;
        log::info!(
            "Platform reset after {:.1}s, mount synced to RA {:.4} Dec {:.3}",
            elapsed.as_secs_f64(),
            target_ra,
            dec
        );
        Ok(())
    }

    /// Replaces the frozen position, as a plate-solve sync would.
    pub fn sync_to_coordinates(&mut self, ra: f64, dec: f64) -> PlatformResult<()> {
        match &mut self.state {
            TrackingState::Tracking {
                start_ra,
                start_dec,
                ..
            } => {
                *start_ra = ra;
                *start_dec = dec;
                log::info!("Platform position synced to RA {:.4} Dec {:.3}", ra, dec);
                Ok(())
            }
            _ => Err(PlatformError::NotTracking),
        }
    }

    fn invalid(&self, action: PlatformAction) -> PlatformError {
        PlatformError::InvalidStateTransition {
            state: self.state_kind(),
            action,
        }
    }
}

/// RA the mount should report once the deck has rotated back by `elapsed`
/// of sidereal motion.
pub fn reset_sync_ra(ra_hours: f64, elapsed: Duration) -> f64 {
    let delta_ra = elapsed.as_secs_f64() * SIDEREAL_DEGREES_PER_SECOND / 15.0;
    norm_ra(ra_hours - delta_ra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{DeviceError, Mount, SimulatedGuidePort, SimulatedMotor, SimulatedMount};
    use crate::geometry::Site;
    use crate::platform::ManualClock;

    struct Rig {
        clock: Arc<ManualClock>,
        mount: SimulatedMount,
        motor: SimulatedMotor,
        devices: Devices,
    }

    fn rig() -> Rig {
        let clock = Arc::new(ManualClock::new());
        let site = Site {
            latitude_deg: 34.0,
            longitude_deg: -118.0,
        };
        let mount = SimulatedMount::new(site, 10.0, 20.0).with_sidereal_time(10.0);
        let motor = SimulatedMotor::new();
        let port = SimulatedGuidePort::new(clock.clone());
        let mut devices = Devices::new(Box::new(mount.clone()), Box::new(port))
            .with_motor(Box::new(motor.clone()));
        devices.connect().unwrap();
        Rig {
            clock,
            mount,
            motor,
            devices,
        }
    }

    fn platform(clock: &Arc<ManualClock>) -> TrackingPlatform {
        TrackingPlatform::new(PlatformConfig::default(), clock.clone())
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_start_captures_position_and_hands_off_tracking() {
        let mut rig = rig();
        let mut platform = platform(&rig.clock);

        platform.start(&mut rig.devices).unwrap();

        assert!(platform.is_tracking());
        assert_eq!(platform.frozen_ra(), Some(10.0));
        assert_eq!(platform.frozen_dec(), Some(20.0));
        assert!(!rig.mount.state().tracking);
        assert!(rig.motor.state().engaged);
        assert!((platform.time_remaining() - platform.config().stroke_seconds()).abs() < 1e-9);
    }

    #[test]
    fn test_time_remaining_counts_down() {
        let mut rig = rig();
        let mut platform = platform(&rig.clock);
        let stroke = platform.config().stroke_seconds();

        platform.start(&mut rig.devices).unwrap();
        rig.clock.advance(secs(100));
        assert!((platform.time_remaining() - (stroke - 100.0)).abs() < 1e-9);

        rig.clock.advance(secs(10_000));
        assert_eq!(platform.time_remaining(), 0.0);
        assert!(platform.is_tracking());
    }

    #[test]
    fn test_pause_syncs_mount_to_frozen_position() {
        let mut rig = rig();
        let mut platform = platform(&rig.clock);

        platform.start(&mut rig.devices).unwrap();
        rig.clock.advance(secs(60));
        platform.pause(&mut rig.devices).unwrap();

        assert_eq!(platform.state_kind(), TrackingStateKind::Stopped);
        assert_eq!(platform.elapsed(), secs(60));
        let mount = rig.mount.state();
        assert_eq!(mount.syncs.last(), Some(&(10.0, 20.0)));
        assert!(mount.tracking);
        assert!(!rig.motor.state().engaged);

        // Paused time does not count against the stroke
        rig.clock.advance(secs(500));
        assert_eq!(platform.elapsed(), secs(60));
    }

    #[test]
    fn test_resume_recaptures_position_and_keeps_elapsed() {
        let mut rig = rig();
        let mut platform = platform(&rig.clock);

        platform.start(&mut rig.devices).unwrap();
        rig.clock.advance(secs(60));
        platform.pause(&mut rig.devices).unwrap();
        rig.mount.slew(11.5, -5.0);
        platform.resume(&mut rig.devices).unwrap();
        rig.clock.advance(secs(40));

        assert_eq!(platform.frozen_ra(), Some(11.5));
        assert_eq!(platform.frozen_dec(), Some(-5.0));
        assert_eq!(platform.elapsed(), secs(100));
    }

    #[test]
    fn test_reset_from_stopped_offsets_mount_ra() {
        let mut rig = rig();
        let mut platform = platform(&rig.clock);

        platform.start(&mut rig.devices).unwrap();
        rig.clock.advance(secs(100));
        platform.pause(&mut rig.devices).unwrap();
        platform.reset(&mut rig.devices).unwrap();

        let expected = 10.0 - 100.0 * SIDEREAL_DEGREES_PER_SECOND / 15.0;
        let mount = rig.mount.state();
        let (ra, dec) = *mount.syncs.last().unwrap();
        assert!((ra - expected).abs() < 1e-12);
        assert!((ra - 9.97215).abs() < 1e-4);
        assert_eq!(dec, 20.0);
        assert!(mount.tracking);
        assert_eq!(platform.state_kind(), TrackingStateKind::AtStart);
        assert_eq!(platform.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_reset_from_tracking_uses_frozen_position() {
        let mut rig = rig();
        let mut platform = platform(&rig.clock);

        platform.start(&mut rig.devices).unwrap();
        rig.mount.slew(3.0, 3.0);
        rig.clock.advance(secs(30));
        platform.reset(&mut rig.devices).unwrap();

        let (ra, _) = *rig.mount.state().syncs.last().unwrap();
        assert!((ra - reset_sync_ra(10.0, secs(30))).abs() < 1e-12);
        assert!(!rig.motor.state().engaged);
        // Drive stopped only for the sync
        assert_eq!(
            rig.mount.state().tracking_changes,
            vec![false, false, true]
        );
    }

    #[test]
    fn test_reset_sync_ra_wraps_below_zero() {
        let ra = reset_sync_ra(0.01, secs(3600));
        assert!(ra > 23.0 && ra < 24.0);
        assert!((ra - (24.01 - 3600.0 * SIDEREAL_DEGREES_PER_SECOND / 15.0)).abs() < 1e-9);
    }

    #[test]
    fn test_transition_table_is_total() {
        use PlatformAction::*;
        use TrackingStateKind::*;

        // (from, action) -> Some(to) on success, None on InvalidStateTransition
        let table = [
            (AtStart, Start, Some(Tracking)),
            (AtStart, Pause, Some(AtStart)),
            (AtStart, Resume, None),
            (AtStart, Reset, Some(AtStart)),
            (Tracking, Start, None),
            (Tracking, Pause, Some(Stopped)),
            (Tracking, Resume, None),
            (Tracking, Reset, Some(AtStart)),
            (Stopped, Start, None),
            (Stopped, Pause, Some(Stopped)),
            (Stopped, Resume, Some(Tracking)),
            (Stopped, Reset, Some(AtStart)),
        ];
        assert_eq!(table.len(), 3 * PlatformAction::ALL.len());

        for (from, action, expected) in table {
            let mut rig = rig();
            let mut platform = platform(&rig.clock);
            match from {
                AtStart => {}
                Tracking => platform.start(&mut rig.devices).unwrap(),
                Stopped => {
                    platform.start(&mut rig.devices).unwrap();
                    platform.pause(&mut rig.devices).unwrap();
                }
            }
            assert_eq!(platform.state_kind(), from);

            let result = platform.apply(action, &mut rig.devices);
            match expected {
                Some(to) => {
                    assert!(result.is_ok(), "{} from {} failed", action, from);
                    assert_eq!(platform.state_kind(), to, "{} from {}", action, from);
                }
                None => {
                    assert!(
                        matches!(
                            result,
                            Err(PlatformError::InvalidStateTransition { state, action: a })
                                if state == from && a == action
                        ),
                        "{} from {} should be rejected",
                        action,
                        from
                    );
                    assert_eq!(platform.state_kind(), from);
                }
            }
        }
    }

    #[test]
    fn test_stroke_locked_unless_at_start() {
        let mut rig = rig();
        let mut platform = platform(&rig.clock);
        let narrow = PlatformConfig::new(10.0).unwrap();

        platform.set_config(narrow).unwrap();
        platform.start(&mut rig.devices).unwrap();
        assert!(matches!(
            platform.set_config(PlatformConfig::default()),
            Err(PlatformError::StrokeLocked)
        ));
        assert_eq!(platform.config(), narrow);
    }

    #[test]
    fn test_sync_replaces_frozen_position_only_while_tracking() {
        let mut rig = rig();
        let mut platform = platform(&rig.clock);

        assert!(matches!(
            platform.sync_to_coordinates(1.0, 2.0),
            Err(PlatformError::NotTracking)
        ));
        platform.start(&mut rig.devices).unwrap();
        platform.sync_to_coordinates(10.1, 19.9).unwrap();
        assert_eq!(platform.frozen_ra(), Some(10.1));
        assert_eq!(platform.frozen_dec(), Some(19.9));
    }

    /// Delegates to a simulated mount but refuses every sync.
    struct SyncRefusingMount(SimulatedMount);

    impl Mount for SyncRefusingMount {
        fn set_connected(&mut self, connected: bool) -> Result<(), DeviceError> {
            self.0.set_connected(connected)
        }
        fn site_latitude(&self) -> Result<f64, DeviceError> {
            self.0.site_latitude()
        }
        fn site_longitude(&self) -> Result<f64, DeviceError> {
            self.0.site_longitude()
        }
        fn sidereal_time(&self) -> Result<f64, DeviceError> {
            self.0.sidereal_time()
        }
        fn right_ascension(&self) -> Result<f64, DeviceError> {
            self.0.right_ascension()
        }
        fn declination(&self) -> Result<f64, DeviceError> {
            self.0.declination()
        }
        fn sync_to_coordinates(&mut self, _ra: f64, _dec: f64) -> Result<(), DeviceError> {
            Err(DeviceError::Failed("sync refused".to_string()))
        }
        fn set_tracking(&mut self, tracking: bool) -> Result<(), DeviceError> {
            self.0.set_tracking(tracking)
        }
    }

    #[test]
    fn test_pause_restores_mount_drive_when_sync_fails() {
        let clock = Arc::new(ManualClock::new());
        let site = Site {
            latitude_deg: 34.0,
            longitude_deg: -118.0,
        };
        let mount = SimulatedMount::new(site, 10.0, 20.0).with_sidereal_time(10.0);
        let motor = SimulatedMotor::new();
        let port = SimulatedGuidePort::new(clock.clone());
        let mut devices = Devices::new(
            Box::new(SyncRefusingMount(mount.clone())),
            Box::new(port),
        )
        .with_motor(Box::new(motor.clone()));
        devices.connect().unwrap();
        let mut platform = platform(&clock);

        platform.start(&mut devices).unwrap();
        assert!(!mount.state().tracking);

        let result = platform.pause(&mut devices);
        assert!(matches!(
            result,
            Err(PlatformError::Device(DeviceError::Failed(_)))
        ));
        assert_eq!(platform.state_kind(), TrackingStateKind::Stopped);
        assert!(!motor.state().engaged);
        assert!(mount.state().tracking);
    }

    #[test]
    fn test_tilt_is_level_at_mid_stroke() {
        let mut rig = rig();
        let mut platform = platform(&rig.clock);
        platform.start(&mut rig.devices).unwrap();

        assert!((platform.tilt_degrees() + 11.0).abs() < 1e-9);
        let half = platform.config().stroke_seconds() / 2.0;
        rig.clock.advance(Duration::from_secs_f64(half));
        assert!(platform.tilt_degrees().abs() < 1e-6);
    }
}
