use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use crate::normalize::{infer_range, to_engineering, EngineeringRange};
use crate::protos::{DeviceInfo, DeviceRange, PositionSpace, ProfileInfo, RawStatus, RunEvent};

fn timestamp(now: &DateTime<Local>) -> String {
  now.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

pub fn format_event(ev: &RunEvent, now: &DateTime<Local>) -> String {
  let body = match ev {
    RunEvent::Waiting { offset, wait } =>
      format!("waiting {:.3}s for {}s", wait.as_secs_f64(), offset),
    RunEvent::Dispatching { setpoint } =>
      format!("{}s: Pan={}, Tilt={}, Zoom={}", setpoint.time_offset_seconds,
        setpoint.pan_degrees, setpoint.tilt_degrees, setpoint.zoom_ratio),
    RunEvent::MoveFailed { index, offset, error } =>
      format!("{}s: move failed (entry {}): {}", offset, index + 1, error),
    RunEvent::Complete { attempted, failed } =>
      format!("schedule complete: {} commands attempted, {} failed", attempted, failed),
    RunEvent::Aborted(reason) => format!("schedule aborted: {}", reason),
  };
  format!("[{}] [SCHEDULE] {}", timestamp(now), body)
}

/// Prints run events as they arrive until the runner drops its sender.
pub async fn print_events(mut recv_events: mpsc::UnboundedReceiver<RunEvent>) {
  while let Some(ev) = recv_events.recv().await {
    println!("{}", format_event(&ev, &Local::now()));
  }
}

/// Human readable position. Without a declared position space the
/// convention is guessed from each pan/tilt value; zoom is taken as unipolar.
pub fn format_status(raw: &RawStatus, space: Option<&PositionSpace>) -> Vec<String> {
  let mut lines = Vec::new();
  if let Some(pan) = raw.pan {
    let range = space.map(|s| s.pan).unwrap_or_else(|| infer_range(pan));
    let deg = to_engineering(pan, range, EngineeringRange::PAN);
    lines.push(format!("Pan: {:.4} (→ {:.2} deg)", pan, deg));
  }
  if let Some(tilt) = raw.tilt {
    let range = space.map(|s| s.tilt).unwrap_or_else(|| infer_range(tilt));
    let deg = to_engineering(tilt, range, EngineeringRange::TILT);
    lines.push(format!("Tilt: {:.4} (→ {:.2} deg)", tilt, deg));
  }
  if let Some(zoom) = raw.zoom {
    let range = space.map(|s| s.zoom).unwrap_or(DeviceRange::UNIPOLAR);
    let ratio = to_engineering(zoom, range, EngineeringRange::ZOOM);
    lines.push(format!("Zoom: {:.4} (→ {:.2}x)", zoom, ratio));
  }
  if lines.is_empty() {
    lines.push("no PTZ position reported".to_string());
  }
  lines
}

pub fn format_device_info(info: &DeviceInfo) -> Vec<String> {
  vec![
    format!("Manufacturer: {}", info.manufacturer),
    format!("Model:        {}", info.model),
    format!("Firmware:     {}", info.firmware_version),
    format!("Serial:       {}", info.serial_number),
    format!("Hardware id:  {}", info.hardware_id),
  ]
}

/// Numbered the way `profile_index` counts them.
pub fn format_profiles(profiles: &[ProfileInfo]) -> Vec<String> {
  profiles.iter().enumerate()
    .map(|(i, p)| format!("Profile #{}: name={}, token={}", i, p.name, p.token))
    .collect()
}
