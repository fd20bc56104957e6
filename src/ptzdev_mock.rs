use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use tokio::time::{self, Duration, Instant};
use crate::protos::{DeviceInfo, DeviceRange, NormalizedPosition, PositionSpace, ProfileInfo, RawStatus, Speed};
use crate::ptzdev::PtzBackend;
use crate::ptzerror::{PTZError, PTZResult};

#[derive(Debug, Clone, PartialEq)]
pub struct MoveRecord {
  pub position: NormalizedPosition,
  pub at: Instant,
  pub accepted: bool,
}

/// In-memory PTZ head. Moves are counted from 0 in dispatch order.
pub struct MockPtz {
  space: PositionSpace,
  fail_connect: bool,
  fail_space: bool,
  fail_status: bool,
  no_snapshot: HashSet<String>,
  failing_moves: HashSet<usize>,
  latency: HashMap<usize, Duration>,
  moves: Arc<Mutex<Vec<MoveRecord>>>,
  memory: Option<NormalizedPosition>,
}

impl MockPtz {
  pub fn new() -> MockPtz {
    MockPtz {
      space: PositionSpace {
        pan: DeviceRange::BIPOLAR,
        tilt: DeviceRange::BIPOLAR,
        zoom: DeviceRange::UNIPOLAR,
      },
      fail_connect: false,
      fail_space: false,
      fail_status: false,
      no_snapshot: HashSet::new(),
      failing_moves: HashSet::new(),
      latency: HashMap::new(),
      moves: Arc::new(Mutex::new(Vec::new())),
      memory: None,
    }
  }
  pub fn with_space(mut self, space: PositionSpace) -> Self {
    self.space = space;
    self
  }
  pub fn fail_connect(mut self) -> Self {
    self.fail_connect = true;
    self
  }
  pub fn fail_position_space(mut self) -> Self {
    self.fail_space = true;
    self
  }
  pub fn fail_status(mut self) -> Self {
    self.fail_status = true;
    self
  }
  /// GetSnapshotUri is refused for this profile token.
  pub fn no_snapshot(mut self, token: &str) -> Self {
    self.no_snapshot.insert(token.to_string());
    self
  }
  pub fn fail_move(mut self, nmove: usize) -> Self {
    self.failing_moves.insert(nmove);
    self
  }
  pub fn move_latency(mut self, nmove: usize, latency: Duration) -> Self {
    self.latency.insert(nmove, latency);
    self
  }
  /// Shared log of every move the device was asked for.
  pub fn moves(&self) -> Arc<Mutex<Vec<MoveRecord>>> {
    self.moves.clone()
  }
}

#[async_trait]
impl PtzBackend for MockPtz {
  async fn connect(&mut self) -> PTZResult<String> {
    if self.fail_connect {
      return Err(PTZError::Connection("mock camera unreachable".to_string()));
    }
    Ok("mock_profile".to_string())
  }
  async fn get_position_space(&mut self) -> PTZResult<PositionSpace> {
    if self.fail_space {
      return Err(PTZError::Query("GetConfigurationOptions not supported".to_string()));
    }
    Ok(self.space)
  }
  async fn absolute_move(&mut self, profile_token: &str, position: NormalizedPosition,
      _speed: Speed) -> PTZResult<()> {
    let nmove = self.moves.lock().map(|m| m.len()).unwrap_or(0);
    let accepted = !self.failing_moves.contains(&nmove);
    if let Ok(mut m) = self.moves.lock() {
      m.push(MoveRecord { position, at: Instant::now(), accepted });
    }
    if let Some(latency) = self.latency.get(&nmove) {
      time::sleep(*latency).await;
    }
    if !accepted {
      return Err(PTZError::Move(format!("mock fault on move {}", nmove)));
    }
    tracing::info!(profile = profile_token, pan = position.pan, tilt = position.tilt,
      zoom = position.zoom, "mock absolute move");
    self.memory = Some(position);
    Ok(())
  }
  async fn get_status(&mut self, _profile_token: &str) -> PTZResult<RawStatus> {
    if self.fail_status {
      return Err(PTZError::Query("GetStatus not supported".to_string()));
    }
    let pos = self.memory.unwrap_or(NormalizedPosition { pan: 0.0, tilt: 0.0, zoom: 0.0 });
    Ok(RawStatus { pan: Some(pos.pan), tilt: Some(pos.tilt), zoom: Some(pos.zoom) })
  }
  async fn device_information(&mut self) -> PTZResult<DeviceInfo> {
    Ok(DeviceInfo {
      manufacturer: "Mock".to_string(),
      model: "PTZ-1".to_string(),
      firmware_version: "1.0".to_string(),
      serial_number: "0001".to_string(),
      hardware_id: "mock".to_string(),
    })
  }
  async fn profiles(&mut self) -> PTZResult<Vec<ProfileInfo>> {
    Ok(vec![
      ProfileInfo { name: "main".to_string(), token: "mock_profile".to_string() },
      ProfileInfo { name: "sub".to_string(), token: "mock_sub".to_string() },
    ])
  }
  async fn snapshot_uri(&mut self, profile_token: &str) -> PTZResult<String> {
    if self.no_snapshot.contains(profile_token) {
      return Err(PTZError::Query(format!("no snapshot for {}", profile_token)));
    }
    Ok(format!("mock://{}/snapshot.jpg", profile_token))
  }
  async fn fetch_snapshot(&mut self, uri: &str) -> PTZResult<Vec<u8>> {
    if !uri.starts_with("mock://") {
      return Err(PTZError::Snapshot(format!("unknown uri {}", uri)));
    }
    // smallest thing that looks like a JPEG: SOI + EOI
    Ok(vec![0xff, 0xd8, 0xff, 0xd9])
  }
  fn describe(&self) -> String {
    "mock".to_string()
  }
}
