use std::fmt;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task;
use crate::protos::{DeviceInfo, NormalizedPosition, PositionSpace, ProfileInfo, RawStatus, Speed};
use crate::ptzerror::{PTZError, PTZResult};

/// Transport to one physical PTZ head. Implementations report connect
/// problems as `Connection`, configuration/status reads as `Query` and
/// rejected moves as `Move`.
#[async_trait]
pub trait PtzBackend: Send + 'static {
    /// Returns the profile token subsequent commands address.
    async fn connect(&mut self) -> PTZResult<String>;
    async fn get_position_space(&mut self) -> PTZResult<PositionSpace>;
    /// Success means the device accepted the command, not that it arrived.
    async fn absolute_move(&mut self, profile_token: &str, position: NormalizedPosition,
        speed: Speed) -> PTZResult<()>;
    async fn get_status(&mut self, profile_token: &str) -> PTZResult<RawStatus>;
    async fn device_information(&mut self) -> PTZResult<DeviceInfo>;
    /// All media profiles in device order; `profile_index` counts into this list.
    async fn profiles(&mut self) -> PTZResult<Vec<ProfileInfo>>;
    async fn snapshot_uri(&mut self, profile_token: &str) -> PTZResult<String>;
    async fn fetch_snapshot(&mut self, uri: &str) -> PTZResult<Vec<u8>>;
    fn describe(&self) -> String;
}

#[derive(Debug)]
pub enum PtzCmd {
    Connect(oneshot::Sender<PTZResult<String>>),
    GetPositionSpace(oneshot::Sender<PTZResult<PositionSpace>>),
    AbsoluteMove(String, NormalizedPosition, Speed, oneshot::Sender<PTZResult<()>>),
    GetStatus(String, oneshot::Sender<PTZResult<RawStatus>>),
    DeviceInformation(oneshot::Sender<PTZResult<DeviceInfo>>),
    Profiles(oneshot::Sender<PTZResult<Vec<ProfileInfo>>>),
    SnapshotUri(String, oneshot::Sender<PTZResult<String>>),
    FetchSnapshot(String, oneshot::Sender<PTZResult<Vec<u8>>>),
}

#[derive(Debug, Clone)]
pub struct DeviceHandle {
    channel: mpsc::Sender<PtzCmd>,
    name: String,
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PTZ {}", self.name)
    }
}

impl DeviceHandle {
    /// Moves the backend onto its own task; commands are served one at a time.
    pub fn spawn<B: PtzBackend>(backend: B) -> DeviceHandle {
        let (send_cmd, recv_cmd) = mpsc::channel(100);
        let name = backend.describe();
        run_handler(backend, recv_cmd);
        DeviceHandle {
            channel: send_cmd,
            name: name,
        }
    }
    async fn send(&self, cmd: PtzCmd) -> PTZResult<()> {
        self.channel.send(cmd).await.map_err(|_x| PTZError::AsyncChannelClosed)
    }
    pub async fn connect(&self) -> PTZResult<String> {
        let (s, r) = oneshot::channel();
        self.send(PtzCmd::Connect(s)).await?;
        r.await.map_err(|_x| PTZError::AsyncChannelNoSender)?
    }
    pub async fn get_position_space(&self) -> PTZResult<PositionSpace> {
        let (s, r) = oneshot::channel();
        self.send(PtzCmd::GetPositionSpace(s)).await?;
        r.await.map_err(|_x| PTZError::AsyncChannelNoSender)?
    }
    pub async fn absolute_move(&self, profile_token: &str, position: NormalizedPosition,
            speed: Speed) -> PTZResult<()> {
        let (s, r) = oneshot::channel();
        self.send(PtzCmd::AbsoluteMove(profile_token.to_string(), position, speed, s)).await?;
        r.await.map_err(|_x| PTZError::AsyncChannelNoSender)?
    }
    pub async fn get_status(&self, profile_token: &str) -> PTZResult<RawStatus> {
        let (s, r) = oneshot::channel();
        self.send(PtzCmd::GetStatus(profile_token.to_string(), s)).await?;
        r.await.map_err(|_x| PTZError::AsyncChannelNoSender)?
    }
    pub async fn device_information(&self) -> PTZResult<DeviceInfo> {
        let (s, r) = oneshot::channel();
        self.send(PtzCmd::DeviceInformation(s)).await?;
        r.await.map_err(|_x| PTZError::AsyncChannelNoSender)?
    }
    pub async fn profiles(&self) -> PTZResult<Vec<ProfileInfo>> {
        let (s, r) = oneshot::channel();
        self.send(PtzCmd::Profiles(s)).await?;
        r.await.map_err(|_x| PTZError::AsyncChannelNoSender)?
    }
    pub async fn snapshot_uri(&self, profile_token: &str) -> PTZResult<String> {
        let (s, r) = oneshot::channel();
        self.send(PtzCmd::SnapshotUri(profile_token.to_string(), s)).await?;
        r.await.map_err(|_x| PTZError::AsyncChannelNoSender)?
    }
    pub async fn fetch_snapshot(&self, uri: &str) -> PTZResult<Vec<u8>> {
        let (s, r) = oneshot::channel();
        self.send(PtzCmd::FetchSnapshot(uri.to_string(), s)).await?;
        r.await.map_err(|_x| PTZError::AsyncChannelNoSender)?
    }
}

async fn run_command<B: PtzBackend>(backend: &mut B, ev: PtzCmd) {
    match ev {
        PtzCmd::Connect(s) => {
            s.send(backend.connect().await).ok();
        },
        PtzCmd::GetPositionSpace(s) => {
            s.send(backend.get_position_space().await).ok();
        },
        PtzCmd::AbsoluteMove(token, position, speed, s) => {
            s.send(backend.absolute_move(&token, position, speed).await).ok();
        },
        PtzCmd::GetStatus(token, s) => {
            s.send(backend.get_status(&token).await).ok();
        },
        PtzCmd::DeviceInformation(s) => {
            s.send(backend.device_information().await).ok();
        },
        PtzCmd::Profiles(s) => {
            s.send(backend.profiles().await).ok();
        },
        PtzCmd::SnapshotUri(token, s) => {
            s.send(backend.snapshot_uri(&token).await).ok();
        },
        PtzCmd::FetchSnapshot(uri, s) => {
            s.send(backend.fetch_snapshot(&uri).await).ok();
        },
    }
}

fn run_handler<B: PtzBackend>(mut backend: B, mut recv_cmd: mpsc::Receiver<PtzCmd>) {
    task::spawn(async move {
        while let Some(ev) = recv_cmd.recv().await {
            run_command(&mut backend, ev).await;
        }
        tracing::debug!(device = %backend.describe(), "device handler stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protos::DeviceRange;
    use crate::ptzdev_mock::MockPtz;

    #[tokio::test]
    async fn test_handle_round_trips_through_actor() {
        let mock = MockPtz::new();
        let moves = mock.moves();
        let dev = DeviceHandle::spawn(mock);
        let token = dev.connect().await.unwrap();
        let space = dev.get_position_space().await.unwrap();
        assert_eq!(space.pan, DeviceRange::BIPOLAR);
        let pos = NormalizedPosition { pan: 0.25, tilt: -0.5, zoom: 0.1 };
        dev.absolute_move(&token, pos, Speed::FULL).await.unwrap();
        let status = dev.get_status(&token).await.unwrap();
        assert_eq!(status.pan, Some(0.25));
        assert_eq!(status.zoom, Some(0.1));
        assert_eq!(moves.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let dev = DeviceHandle::spawn(MockPtz::new().fail_connect());
        assert!(matches!(dev.connect().await, Err(PTZError::Connection(_))));
    }

    #[tokio::test]
    async fn test_display_names_backend() {
        let dev = DeviceHandle::spawn(MockPtz::new());
        assert_eq!(dev.to_string(), "PTZ mock");
    }

    #[tokio::test]
    async fn test_profile_and_snapshot_commands() {
        let dev = DeviceHandle::spawn(MockPtz::new());
        let profiles = dev.profiles().await.unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[0].token, "mock_profile");
        let uri = dev.snapshot_uri(&profiles[0].token).await.unwrap();
        assert!(dev.fetch_snapshot(&uri).await.unwrap().starts_with(&[0xff, 0xd8]));
        assert_eq!(dev.device_information().await.unwrap().manufacturer, "Mock");
    }
}
