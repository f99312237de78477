//! The shared hub every virtual-mount client talks through.
//!
//! One [`TrackingPlatform`] and one set of [`Devices`] sit behind a single
//! lock, so platform transitions and guide dispatches never interleave.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::devices::Devices;
use crate::geometry::{equatorial_to_horizontal, horizontal_to_equatorial, SkyPosition};
use crate::guide::{
    DispatchReport, DispatchSettings, GuideDirection, GuideGeometry, GuidePulseTransform,
    GuideRequest, PulseDispatcher,
};
use crate::platform::{
    Clock, PlatformAction, PlatformConfig, PlatformError, PlatformResult, PlatformStatus,
    TrackingPlatform, TrackingStateKind, DEFAULT_STROKE_DEGREES,
};
use crate::settings::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdapterOptions {
    /// Stroke used while the settings store holds none.
    pub default_stroke_degrees: f64,
    pub max_pulse_ms: u32,
    pub dispatch: DispatchSettings,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        AdapterOptions {
            default_stroke_degrees: DEFAULT_STROKE_DEGREES,
            max_pulse_ms: 2500,
            dispatch: DispatchSettings::default(),
        }
    }
}

struct Inner {
    platform: TrackingPlatform,
    devices: Devices,
    connections: usize,
}

pub struct Adapter {
    options: AdapterOptions,
    transform: GuidePulseTransform,
    dispatcher: PulseDispatcher,
    clock: Arc<dyn Clock>,
    settings: Arc<dyn SettingsStore>,
    inner: Mutex<Inner>,
}

/// A connected client. Dropping the last one disconnects the rig.
pub struct Session {
    adapter: Arc<Adapter>,
}

impl Session {
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.adapter.release();
    }
}

impl Adapter {
    pub fn new(
        devices: Devices,
        settings: Arc<dyn SettingsStore>,
        clock: Arc<dyn Clock>,
        options: AdapterOptions,
    ) -> Self {
        let config = stored_config(settings.as_ref(), options.default_stroke_degrees);
        Adapter {
            options,
            transform: GuidePulseTransform::new(options.max_pulse_ms),
            dispatcher: PulseDispatcher::new(options.dispatch),
            clock: clock.clone(),
            settings,
            inner: Mutex::new(Inner {
                platform: TrackingPlatform::new(config, clock),
                devices,
                connections: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connect(self: &Arc<Self>) -> PlatformResult<Session> {
        let mut inner = self.lock();
        if inner.connections == 0 {
            inner.devices.connect()?;
            log::info!("Devices connected");
        }
        inner.connections += 1;
        log::debug!("Client connected, {} active", inner.connections);
        Ok(Session {
            adapter: Arc::clone(self),
        })
    }

    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    fn release(&self) {
        let mut inner = self.lock();
        inner.connections = inner.connections.saturating_sub(1);
        if inner.connections > 0 {
            log::debug!("Client disconnected, {} active", inner.connections);
            return;
        }

        if inner.platform.is_tracking() {
            if let Err(e) = inner.devices.engage_motor(false) {
                log::warn!("Could not stop platform motor on disconnect: {}", e);
            }
        }
        inner.devices.disconnect();
        let config = stored_config(self.settings.as_ref(), self.options.default_stroke_degrees);
        inner.platform.reinitialize(config);
        log::info!("Last client disconnected, platform back at start");
    }

    pub fn start(&self) -> PlatformResult<()> {
        self.apply(PlatformAction::Start)
    }

    pub fn pause(&self) -> PlatformResult<()> {
        self.apply(PlatformAction::Pause)
    }

    pub fn resume(&self) -> PlatformResult<()> {
        self.apply(PlatformAction::Resume)
    }

    pub fn reset(&self) -> PlatformResult<()> {
        self.apply(PlatformAction::Reset)
    }

    pub fn apply(&self, action: PlatformAction) -> PlatformResult<()> {
        self.transition(action).map(|_| ())
    }

    /// Applies `action` and reports the status it left, under one lock.
    pub fn transition(&self, action: PlatformAction) -> PlatformResult<PlatformStatus> {
        let mut inner = self.lock();
        let Inner {
            platform, devices, ..
        } = &mut *inner;
        platform.apply(action, devices)?;
        Ok(platform.status())
    }

    /// Pauses once the stroke has run out. Returns whether it paused.
    pub fn pause_if_exhausted(&self) -> PlatformResult<bool> {
        let mut inner = self.lock();
        let Inner {
            platform, devices, ..
        } = &mut *inner;
        if !platform.is_tracking() || platform.time_remaining() > 0.0 {
            return Ok(false);
        }
        log::warn!("Platform stroke exhausted, pausing");
        platform.pause(devices)?;
        Ok(true)
    }

    pub fn state(&self) -> TrackingStateKind {
        self.lock().platform.state_kind()
    }

    pub fn is_tracking(&self) -> bool {
        self.lock().platform.is_tracking()
    }

    pub fn frozen_ra(&self) -> Option<f64> {
        self.lock().platform.frozen_ra()
    }

    pub fn frozen_dec(&self) -> Option<f64> {
        self.lock().platform.frozen_dec()
    }

    pub fn time_remaining(&self) -> f64 {
        self.lock().platform.time_remaining()
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().platform.elapsed()
    }

    pub fn status(&self) -> PlatformStatus {
        self.lock().platform.status()
    }

    pub fn stroke_degrees(&self) -> f64 {
        self.lock().platform.config().stroke_degrees()
    }

    /// Only allowed at the start of the stroke. The value is saved first and
    /// only goes live once it is persisted. Returns the resulting status.
    pub fn set_stroke_degrees(&self, stroke_degrees: f64) -> PlatformResult<PlatformStatus> {
        let config = PlatformConfig::new(stroke_degrees)?;
        let mut inner = self.lock();
        if inner.platform.state_kind() != TrackingStateKind::AtStart {
            return Err(PlatformError::StrokeLocked);
        }
        self.settings.save_stroke_degrees(stroke_degrees)?;
        inner.platform.set_config(config)?;
        log::info!(
            "Stroke set to {:.2} deg ({:.1}s)",
            config.stroke_degrees(),
            config.stroke_seconds()
        );
        Ok(inner.platform.status())
    }

    /// Position reported to clients: the frozen RA/Dec while tracking,
    /// otherwise wherever the mount says it points.
    pub fn virtual_position(&self) -> PlatformResult<SkyPosition> {
        let inner = self.lock();
        let mount = &inner.devices.mount;
        let (ra, dec) = match (inner.platform.frozen_ra(), inner.platform.frozen_dec()) {
            (Some(ra), Some(dec)) => (ra, dec),
            _ => (mount.right_ascension()?, mount.declination()?),
        };
        Ok(equatorial_to_horizontal(
            mount.site_latitude()?,
            mount.sidereal_time()?,
            ra,
            dec,
        ))
    }

    pub fn right_ascension(&self) -> PlatformResult<f64> {
        Ok(self.virtual_position()?.ra_hours())
    }

    pub fn declination(&self) -> PlatformResult<f64> {
        Ok(self.virtual_position()?.dec_deg)
    }

    pub fn virtual_altitude(&self) -> PlatformResult<f64> {
        Ok(self.virtual_position()?.altitude_deg)
    }

    pub fn virtual_azimuth(&self) -> PlatformResult<f64> {
        Ok(self.virtual_position()?.azimuth_deg)
    }

    /// While tracking this moves the frozen position; otherwise the mount
    /// itself is synced.
    pub fn sync_to_coordinates(&self, ra_hours: f64, dec_deg: f64) -> PlatformResult<()> {
        let mut inner = self.lock();
        if inner.platform.is_tracking() {
            inner.platform.sync_to_coordinates(ra_hours, dec_deg)
        } else {
            inner.devices.mount.sync_to_coordinates(ra_hours, dec_deg)?;
            Ok(())
        }
    }

    pub fn sync_to_alt_az(&self, azimuth_deg: f64, altitude_deg: f64) -> PlatformResult<()> {
        let (ra, dec) = {
            let inner = self.lock();
            let mount = &inner.devices.mount;
            horizontal_to_equatorial(
                mount.site_latitude()?,
                mount.sidereal_time()?,
                azimuth_deg,
                altitude_deg,
            )
        };
        self.sync_to_coordinates(ra, dec)
    }

    pub fn is_pulse_guiding(&self) -> PlatformResult<bool> {
        if self.dispatcher.is_busy() {
            return Ok(true);
        }
        let inner = self.lock();
        if !inner.platform.is_tracking() {
            return Ok(false);
        }
        Ok(inner.devices.port.is_guiding()?)
    }

    /// Translates one virtual-mount guide pulse and sends the physical
    /// pulses out of the guide port, blocking until they are issued.
    pub fn handle_guide_pulse(
        &self,
        direction: GuideDirection,
        duration_ms: u32,
    ) -> PlatformResult<DispatchReport> {
        let guard = self.dispatcher.begin()?;
        let mut inner = self.lock();
        if !inner.platform.is_tracking() {
            return Err(PlatformError::NotTracking);
        }

        let geometry = snapshot(&inner)?;
        let request = GuideRequest::from_direction(direction, duration_ms);
        let correction = self.transform.transform(request, &geometry);

        let Inner {
            platform, devices, ..
        } = &mut *inner;
        self.dispatcher.dispatch(
            &guard,
            platform,
            correction,
            devices.port.as_mut(),
            self.clock.as_ref(),
        )
    }
}

fn snapshot(inner: &Inner) -> PlatformResult<GuideGeometry> {
    let (Some(ra_hours), Some(dec_deg)) = (inner.platform.frozen_ra(), inner.platform.frozen_dec())
    else {
        return Err(PlatformError::NotTracking);
    };
    let mount = &inner.devices.mount;
    Ok(GuideGeometry {
        latitude_deg: mount.site_latitude()?,
        lst_hours: mount.sidereal_time()?,
        ra_hours,
        dec_deg,
        tilt_deg: inner.platform.tilt_degrees(),
    })
}

fn stored_config(settings: &dyn SettingsStore, default_stroke_degrees: f64) -> PlatformConfig {
    let stroke = match settings.load_stroke_degrees() {
        Ok(Some(stroke)) => stroke,
        Ok(None) => default_stroke_degrees,
        Err(e) => {
            log::warn!("Could not load saved stroke, using default: {}", e);
            default_stroke_degrees
        }
    };
    PlatformConfig::new(stroke)
        .or_else(|_| PlatformConfig::new(default_stroke_degrees))
        .unwrap_or_default()
}
