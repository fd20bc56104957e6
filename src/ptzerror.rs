use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PTZError {
  #[error("row {row}: {reason}")]
  Validation { row: usize, reason: String },
  #[error("couldn't connect to camera: {0}")]
  Connection(String),
  #[error("camera query failed: {0}")]
  Query(String),
  #[error("absolute move rejected: {0}")]
  Move(String),
  #[error("snapshot failed: {0}")]
  Snapshot(String),
  #[error("device range [{min}, {max}] has min above max")]
  InvalidRange { min: f64, max: f64 },
  #[error("Sending to a closed channel")]
  AsyncChannelClosed,
  #[error("Receiving from a closed channel")]
  AsyncChannelNoSender,
  #[error("Couldn't locate config directories")]
  BadDirs,
  #[error("bad configuration: {0}")]
  Config(String),
  #[error(transparent)]
  Io(#[from] io::Error),
  #[error(transparent)]
  Http(#[from] reqwest::Error),
}

pub type PTZResult<T> = Result<T, PTZError>;

impl PTZError {
  pub fn validation(row: usize, reason: impl Into<String>) -> Self {
    PTZError::Validation { row, reason: reason.into() }
  }
}
