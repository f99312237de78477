//! Hardware collaborators driven by the adapter.
//!
//! Each trait is the smallest surface the platform needs from the real
//! device. Methods that talk to hardware return [`DeviceError`] so failures
//! from a driver surface through the platform error unchanged.

mod error;
mod sim;

pub use error::DeviceError;
pub use sim::{
    MotorState, MountState, PortState, SimulatedGuidePort, SimulatedMotor, SimulatedMount,
};

use crate::guide::GuideDirection;

/// The alt-az mount riding on the platform.
pub trait Mount: Send {
    fn set_connected(&mut self, _connected: bool) -> Result<(), DeviceError> {
        Ok(())
    }
    fn site_latitude(&self) -> Result<f64, DeviceError>;
    fn site_longitude(&self) -> Result<f64, DeviceError>;
    /// Local sidereal time in hours.
    fn sidereal_time(&self) -> Result<f64, DeviceError>;
    /// Hours.
    fn right_ascension(&self) -> Result<f64, DeviceError>;
    /// Degrees.
    fn declination(&self) -> Result<f64, DeviceError>;
    fn sync_to_coordinates(&mut self, ra_hours: f64, dec_deg: f64) -> Result<(), DeviceError>;
    fn set_tracking(&mut self, tracking: bool) -> Result<(), DeviceError>;
}

/// The single ST4-style guide output shared by both physical axes.
pub trait PulseGuidePort: Send {
    fn set_connected(&mut self, _connected: bool) -> Result<(), DeviceError> {
        Ok(())
    }
    fn can_pulse_guide(&self) -> Result<bool, DeviceError> {
        Ok(true)
    }
    fn pulse_guide(&mut self, direction: GuideDirection, duration_ms: u32)
        -> Result<(), DeviceError>;
    fn is_guiding(&self) -> Result<bool, DeviceError>;
}

/// Switch channel that engages the platform drive.
pub trait PlatformMotor: Send {
    fn set_connected(&mut self, _connected: bool) -> Result<(), DeviceError> {
        Ok(())
    }
    fn set_engaged(&mut self, engaged: bool) -> Result<(), DeviceError>;
}

/// The connected rig: one mount, one guide port and an optional motor switch.
pub struct Devices {
    pub mount: Box<dyn Mount>,
    pub port: Box<dyn PulseGuidePort>,
    pub motor: Option<Box<dyn PlatformMotor>>,
}

impl Devices {
    pub fn new(mount: Box<dyn Mount>, port: Box<dyn PulseGuidePort>) -> Self {
        Self {
            mount,
            port,
            motor: None,
        }
    }

    pub fn with_motor(mut self, motor: Box<dyn PlatformMotor>) -> Self {
        self.motor = Some(motor);
        self
    }

    /// Without a motor switch the platform drive is operated by hand.
    pub fn engage_motor(&mut self, engaged: bool) -> Result<(), DeviceError> {
        if let Some(motor) = self.motor.as_mut() {
            motor.set_engaged(engaged)?;
        }
        Ok(())
    }

    /// Connects mount, motor and guide port, rolling back on failure.
    pub fn connect(&mut self) -> Result<(), DeviceError> {
        self.mount.set_connected(true)?;

        if let Some(motor) = self.motor.as_mut() {
            if let Err(e) = motor.set_connected(true) {
                log::warn!("Motor connection failed, releasing mount: {}", e);
                let _ = self.mount.set_connected(false);
                return Err(e);
            }
        }

        if let Err(e) = self.connect_port() {
            log::warn!("Guide port connection failed, releasing mount and motor: {}", e);
            if let Some(motor) = self.motor.as_mut() {
                let _ = motor.set_connected(false);
            }
            let _ = self.mount.set_connected(false);
            return Err(e);
        }
        Ok(())
    }

    /// Leaves the port disconnected on any failure.
    fn connect_port(&mut self) -> Result<(), DeviceError> {
        self.port.set_connected(true)?;
        let can_guide = match self.port.can_pulse_guide() {
            Ok(can_guide) => can_guide,
            Err(e) => {
                let _ = self.port.set_connected(false);
                return Err(e);
            }
        };
        if !can_guide {
            let _ = self.port.set_connected(false);
            return Err(DeviceError::Unsupported("pulse guiding"));
        }
        Ok(())
    }

    /// Best effort: disconnect failures are logged and ignored.
    pub fn disconnect(&mut self) {
        if let Err(e) = self.mount.set_connected(false) {
            log::warn!("Mount disconnect failed: {}", e);
        }
        if let Some(motor) = self.motor.as_mut() {
            if let Err(e) = motor.set_connected(false) {
                log::warn!("Motor disconnect failed: {}", e);
            }
        }
        if let Err(e) = self.port.set_connected(false) {
            log::warn!("Guide port disconnect failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Site;

    /// A guide port whose driver cannot be opened.
    struct UnreachablePort;

    impl PulseGuidePort for UnreachablePort {
        fn set_connected(&mut self, _connected: bool) -> Result<(), DeviceError> {
            Err(DeviceError::Failed("port unavailable".to_string()))
        }
        fn pulse_guide(&mut self, _: GuideDirection, _: u32) -> Result<(), DeviceError> {
            Err(DeviceError::NotConnected)
        }
        fn is_guiding(&self) -> Result<bool, DeviceError> {
            Err(DeviceError::NotConnected)
        }
    }

    fn mount() -> SimulatedMount {
        SimulatedMount::new(
            Site {
                latitude_deg: 34.0,
                longitude_deg: -118.0,
            },
            10.0,
            20.0,
        )
    }

    #[test]
    fn test_failed_port_connect_releases_mount_and_motor() {
        let mount = mount();
        let motor = SimulatedMotor::new();
        let mut devices = Devices::new(Box::new(mount.clone()), Box::new(UnreachablePort))
            .with_motor(Box::new(motor.clone()));

        let result = devices.connect();
        assert!(matches!(result, Err(DeviceError::Failed(_))));
        assert!(!mount.state().connected);
        assert!(!motor.state().connected);
    }

    #[test]
    fn test_port_without_guiding_releases_everything() {
        let clock = std::sync::Arc::new(crate::platform::ManualClock::new());
        let mount = mount();
        let motor = SimulatedMotor::new();
        let port = SimulatedGuidePort::new(clock);
        port.set_can_pulse_guide(false);
        let mut devices = Devices::new(Box::new(mount.clone()), Box::new(port.clone()))
            .with_motor(Box::new(motor.clone()));

        assert!(matches!(
            devices.connect(),
            Err(DeviceError::Unsupported(_))
        ));
        assert!(!mount.state().connected);
        assert!(!motor.state().connected);
        assert!(!port.state().connected);
    }
}
