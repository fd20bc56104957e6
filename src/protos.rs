use tokio::time::Duration;
use crate::ptzerror::{PTZError, PTZResult};
use crate::schedule::Setpoint;

/// Normalized range one axis of the camera reports in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceRange {
  pub min: f64,
  pub max: f64,
}

impl DeviceRange {
  pub const BIPOLAR: DeviceRange = DeviceRange { min: -1.0, max: 1.0 };
  pub const UNIPOLAR: DeviceRange = DeviceRange { min: 0.0, max: 1.0 };

  pub fn new(min: f64, max: f64) -> PTZResult<DeviceRange> {
    // also rejects NaN bounds
    if !(min <= max) {
      return Err(PTZError::InvalidRange { min, max });
    }
    Ok(DeviceRange { min, max })
  }

  pub fn clamp(&self, v: f64) -> f64 {
    v.max(self.min).min(self.max)
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSpace {
  pub pan: DeviceRange,
  pub tilt: DeviceRange,
  pub zoom: DeviceRange,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPosition {
  pub pan: f64,
  pub tilt: f64,
  pub zoom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Speed {
  pub pan: f64,
  pub tilt: f64,
  pub zoom: f64,
}

impl Speed {
  pub const FULL: Speed = Speed { pan: 1.0, tilt: 1.0, zoom: 1.0 };
}

/// Position as read back from the camera, axes it didn't report are None.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawStatus {
  pub pan: Option<f64>,
  pub tilt: Option<f64>,
  pub zoom: Option<f64>,
}

/// Identity as reported by the camera's device service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceInfo {
  pub manufacturer: String,
  pub model: String,
  pub firmware_version: String,
  pub serial_number: String,
  pub hardware_id: String,
}

/// One media profile; `token` is what PTZ commands address.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileInfo {
  pub name: String,
  pub token: String,
}

#[derive(Debug, Clone)]
pub enum RunEvent {
  Waiting { offset: f64, wait: Duration },
  Dispatching { setpoint: Setpoint },
  MoveFailed { index: usize, offset: f64, error: String },
  Complete { attempted: usize, failed: usize },
  Aborted(String),
}
