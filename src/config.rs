use std::path::{Path, PathBuf};
use serde::Deserialize;
use tokio::fs;
use dirs;
use crate::ptzerror::{PTZError, PTZResult};

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
  pub host: String,
  pub port: u16,
  pub username: String,
  pub password: String,
  pub profile_index: usize,
  pub timeout_ms: u64,
}

impl Default for CameraConfig {
  fn default() -> Self {
    CameraConfig {
      host: String::new(),
      port: 80,
      username: String::new(),
      password: String::new(),
      profile_index: 0,
      timeout_ms: 10_000,
    }
  }
}

pub fn default_config_path() -> PTZResult<PathBuf> {
  let mut path = dirs::config_dir().ok_or(PTZError::BadDirs)?;
  path.push("ptz-schedule");
  path.push("camera.toml");
  Ok(path)
}

pub fn parse_config(text: &str) -> PTZResult<CameraConfig> {
  toml::from_str(text).map_err(|e| PTZError::Config(e.to_string()))
}

/// An explicitly named file must exist; the default location may be absent.
pub async fn load_config(explicit: Option<&Path>) -> PTZResult<CameraConfig> {
  let path = match explicit {
    Some(p) => p.to_path_buf(),
    None => {
      let p = default_config_path()?;
      if !fs::try_exists(&p).await? {
        tracing::debug!(path = %p.display(), "no config file, using defaults");
        return Ok(CameraConfig::default());
      }
      p
    }
  };
  let text = fs::read_to_string(&path).await
    .map_err(|e| PTZError::Config(format!("{}: {}", path.display(), e)))?;
  let cfg = parse_config(&text)?;
  tracing::info!(path = %path.display(), host = %cfg.host, port = cfg.port, "configuration loaded");
  Ok(cfg)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_partial_file_keeps_defaults() {
    let cfg = parse_config("host = \"192.168.20.52\"\nusername = \"root\"\n").unwrap();
    assert_eq!(cfg.host, "192.168.20.52");
    assert_eq!(cfg.username, "root");
    assert_eq!(cfg.port, 80);
    assert_eq!(cfg.timeout_ms, 10_000);
  }

  #[test]
  fn test_bad_toml_is_config_error() {
    assert!(matches!(parse_config("port = \"eighty\""), Err(PTZError::Config(_))));
  }

  #[tokio::test]
  async fn test_load_explicit_file() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    write!(f, "host = \"cam.local\"\nport = 8080\nprofile_index = 1\n").unwrap();
    let cfg = load_config(Some(f.path())).await.unwrap();
    assert_eq!(cfg.host, "cam.local");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.profile_index, 1);
  }

  #[tokio::test]
  async fn test_missing_explicit_file_fails() {
    let r = load_config(Some(Path::new("/nonexistent/camera.toml"))).await;
    assert!(matches!(r, Err(PTZError::Config(_))));
  }
}
