//! ONVIF PTZ backend speaking SOAP 1.2 over HTTP.
//!
//! Authentication is WS-Security UsernameToken with a password digest.
//! Responses are read with small namespace-agnostic extractors rather than
//! a full XML parser; only the handful of elements below are ever needed.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::time::Duration;
use crate::config::CameraConfig;
use crate::protos::{DeviceInfo, DeviceRange, NormalizedPosition, PositionSpace, ProfileInfo, RawStatus, Speed};
use crate::ptzdev::PtzBackend;
use crate::ptzerror::{PTZError, PTZResult};

const NS_DEVICE: &str = "http://www.onvif.org/ver10/device/wsdl";
const NS_MEDIA: &str = "http://www.onvif.org/ver10/media/wsdl";
const NS_PTZ: &str = "http://www.onvif.org/ver20/ptz/wsdl";
const NS_SCHEMA: &str = "http://www.onvif.org/ver10/schema";

pub struct OnvifCamera {
    base: String,
    username: String,
    password: String,
    profile_index: usize,
    media_url: String,
    ptz_url: String,
    client: Client,
}

impl OnvifCamera {
    pub fn new(cfg: &CameraConfig) -> PTZResult<OnvifCamera> {
        if cfg.host.is_empty() {
            return Err(PTZError::Config("no camera host configured".to_string()));
        }
        let base = format!("http://{}:{}", cfg.host, cfg.port);
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(OnvifCamera {
            media_url: format!("{}/onvif/media_service", base),
            ptz_url: format!("{}/onvif/ptz_service", base),
            base,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            profile_index: cfg.profile_index,
            client,
        })
    }

    fn device_url(&self) -> String {
        format!("{}/onvif/device_service", self.base)
    }

    fn security_header(&self) -> String {
        let nonce: [u8; 16] = rand::random();
        let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        password_digest_header(&self.username, &self.password, &nonce, &created)
    }

    fn envelope(&self, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:tds="{}" xmlns:trt="{}" xmlns:tptz="{}" xmlns:tt="{}">
  {}
  <s:Body>
    {}
  </s:Body>
</s:Envelope>"#,
            NS_DEVICE, NS_MEDIA, NS_PTZ, NS_SCHEMA,
            self.security_header(),
            body
        )
    }

    /// Posts one SOAP call; the error is the fault or transport text.
    async fn soap(&self, url: &str, action: &str, body: &str) -> Result<String, String> {
        tracing::debug!(url = %url, action = %action, "sending ONVIF request");
        let response = self.client
            .post(url)
            .header("Content-Type", "application/soap+xml; charset=utf-8")
            .body(self.envelope(body))
            .send()
            .await
            .map_err(|e| format!("{} request failed: {}", action, e))?;
        let status = response.status();
        let text = response.text().await
            .map_err(|e| format!("{} response unreadable: {}", action, e))?;
        if let Some(reason) = fault_reason(&text) {
            return Err(format!("{} SOAP fault: {}", action, reason));
        }
        if !status.is_success() {
            return Err(format!("{} failed with status {}", action, status));
        }
        Ok(text)
    }
}

#[async_trait]
impl PtzBackend for OnvifCamera {
    async fn connect(&mut self) -> PTZResult<String> {
        let caps = self.soap(&self.device_url(), "GetCapabilities",
            "<tds:GetCapabilities><tds:Category>All</tds:Category></tds:GetCapabilities>").await
            .map_err(PTZError::Connection)?;
        if let Some(url) = capability_xaddr(&caps, "Media") {
            self.media_url = url;
        }
        if let Some(url) = capability_xaddr(&caps, "PTZ") {
            self.ptz_url = url;
        }
        let profiles = self.profiles().await?;
        let token = profiles.get(self.profile_index).map(|p| p.token.clone()).ok_or_else(|| {
            PTZError::Connection(format!("profile #{} not available, camera has {} profiles",
                self.profile_index, profiles.len()))
        })?;
        tracing::info!(profile = %token, ptz = %self.ptz_url, "ONVIF camera connected");
        Ok(token)
    }

    async fn get_position_space(&mut self) -> PTZResult<PositionSpace> {
        let cfgs = self.soap(&self.ptz_url, "GetConfigurations", "<tptz:GetConfigurations/>").await
            .map_err(PTZError::Query)?;
        let cfg_token = element(&cfgs, "PTZConfiguration")
            .and_then(|e| attribute(e.open, "token"))
            .ok_or_else(|| PTZError::Query("camera has no PTZ configuration".to_string()))?;
        let body = format!(
            "<tptz:GetConfigurationOptions><tptz:ConfigurationToken>{}</tptz:ConfigurationToken></tptz:GetConfigurationOptions>",
            cfg_token);
        let opts = self.soap(&self.ptz_url, "GetConfigurationOptions", &body).await
            .map_err(PTZError::Query)?;
        parse_position_space(&opts)
    }

    async fn absolute_move(&mut self, profile_token: &str, position: NormalizedPosition,
            speed: Speed) -> PTZResult<()> {
        let body = format!(
            r#"<tptz:AbsoluteMove>
      <tptz:ProfileToken>{}</tptz:ProfileToken>
      <tptz:Position>
        <tt:PanTilt x="{}" y="{}"/>
        <tt:Zoom x="{}"/>
      </tptz:Position>
      <tptz:Speed>
        <tt:PanTilt x="{}" y="{}"/>
        <tt:Zoom x="{}"/>
      </tptz:Speed>
    </tptz:AbsoluteMove>"#,
            profile_token, position.pan, position.tilt, position.zoom,
            speed.pan, speed.tilt, speed.zoom);
        self.soap(&self.ptz_url, "AbsoluteMove", &body).await.map_err(PTZError::Move)?;
        Ok(())
    }

    async fn get_status(&mut self, profile_token: &str) -> PTZResult<RawStatus> {
        let body = format!(
            "<tptz:GetStatus><tptz:ProfileToken>{}</tptz:ProfileToken></tptz:GetStatus>",
            profile_token);
        let status = self.soap(&self.ptz_url, "GetStatus", &body).await.map_err(PTZError::Query)?;
        parse_status(&status)
    }

    async fn device_information(&mut self) -> PTZResult<DeviceInfo> {
        let info = self.soap(&self.device_url(), "GetDeviceInformation",
            "<tds:GetDeviceInformation/>").await.map_err(PTZError::Query)?;
        Ok(parse_device_information(&info))
    }

    async fn profiles(&mut self) -> PTZResult<Vec<ProfileInfo>> {
        let xml = self.soap(&self.media_url, "GetProfiles", "<trt:GetProfiles/>").await
            .map_err(PTZError::Connection)?;
        let profiles = parse_profiles(&xml);
        if profiles.is_empty() {
            return Err(PTZError::Connection("camera reports no media profiles".to_string()));
        }
        Ok(profiles)
    }

    async fn snapshot_uri(&mut self, profile_token: &str) -> PTZResult<String> {
        let body = format!(
            "<trt:GetSnapshotUri><trt:ProfileToken>{}</trt:ProfileToken></trt:GetSnapshotUri>",
            profile_token);
        let xml = self.soap(&self.media_url, "GetSnapshotUri", &body).await
            .map_err(PTZError::Query)?;
        parse_media_uri(&xml)
            .ok_or_else(|| PTZError::Query("snapshot response carries no Uri".to_string()))
    }

    async fn fetch_snapshot(&mut self, uri: &str) -> PTZResult<Vec<u8>> {
        let response = self.client
            .get(uri)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| PTZError::Snapshot(format!("GET {} failed: {}", uri, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PTZError::Snapshot(format!("GET {} answered {}", uri, status)));
        }
        let bytes = response.bytes().await
            .map_err(|e| PTZError::Snapshot(format!("GET {} body: {}", uri, e)))?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        format!("onvif {}", self.base)
    }
}

fn password_digest_header(username: &str, password: &str, nonce: &[u8], created: &str) -> String {
    let b64 = base64::engine::general_purpose::STANDARD;
    // Base64(SHA1(nonce + created + password))
    let mut hasher = Sha1::new();
    hasher.update(nonce);
    hasher.update(created.as_bytes());
    hasher.update(password.as_bytes());
    let digest = b64.encode(hasher.finalize());
    format!(
        r#"<s:Header>
    <Security xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" s:mustUnderstand="true">
      <UsernameToken>
        <Username>{}</Username>
        <Password Type="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordDigest">{}</Password>
        <Nonce EncodingType="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary">{}</Nonce>
        <Created xmlns="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd">{}</Created>
      </UsernameToken>
    </Security>
  </s:Header>"#,
        username, digest, b64.encode(nonce), created
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Element<'a> {
    /// The opening tag including its attributes.
    open: &'a str,
    inner: &'a str,
    /// Offset just past the element in the searched text.
    end: usize,
}

/// First element whose local name (prefix stripped) is `tag`.
fn element<'a>(xml: &'a str, tag: &str) -> Option<Element<'a>> {
    let mut from = 0;
    while let Some(rel) = xml[from..].find('<') {
        let start = from + rel;
        let rest = &xml[start + 1..];
        let name_len = rest.find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let name = &rest[..name_len];
        from = start + 1;
        if name.is_empty() || name.starts_with(['?', '!']) {
            continue;
        }
        if name.rsplit(':').next() != Some(tag) {
            continue;
        }
        let open_end = start + xml[start..].find('>')?;
        let open = &xml[start..=open_end];
        if open.ends_with("/>") {
            return Some(Element { open, inner: "", end: open_end + 1 });
        }
        let close = format!("</{}>", name);
        let close_start = open_end + 1 + xml[open_end + 1..].find(close.as_str())?;
        return Some(Element {
            open,
            inner: &xml[open_end + 1..close_start],
            end: close_start + close.len(),
        });
    }
    None
}

fn elements<'a>(xml: &'a str, tag: &str) -> Vec<Element<'a>> {
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(e) = element(&xml[from..], tag) {
        from += e.end;
        found.push(e);
    }
    found
}

fn text<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    element(xml, tag).map(|e| e.inner.trim()).filter(|t| !t.is_empty())
}

fn attribute<'a>(open: &'a str, name: &str) -> Option<&'a str> {
    let pattern = format!("{}=", name);
    let mut from = 0;
    while let Some(rel) = open[from..].find(pattern.as_str()) {
        let at = from + rel;
        from = at + pattern.len();
        // must be a whole attribute name, not the tail of e.g. xmlns:x=
        if !open[..at].ends_with(char::is_whitespace) {
            continue;
        }
        let after = &open[from..];
        let quote = after.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let value = &after[1..];
        return value.find(quote).map(|end| &value[..end]);
    }
    None
}

fn fault_reason(xml: &str) -> Option<String> {
    let fault = element(xml, "Fault")?;
    let reason = element(fault.inner, "Reason")
        .and_then(|r| text(r.inner, "Text"))
        .or_else(|| text(fault.inner, "faultstring"))
        .unwrap_or_else(|| fault.inner.trim());
    Some(reason.to_string())
}

fn capability_xaddr(xml: &str, capability: &str) -> Option<String> {
    element(xml, capability)
        .and_then(|c| text(c.inner, "XAddr"))
        .map(str::to_string)
}

fn parse_profiles(xml: &str) -> Vec<ProfileInfo> {
    elements(xml, "Profiles").iter()
        .filter_map(|p| {
            let token = attribute(p.open, "token")?;
            // the profile's own Name precedes those of its nested configurations
            let name = text(p.inner, "Name").unwrap_or("(unnamed)");
            Some(ProfileInfo { name: unescape(name), token: token.to_string() })
        })
        .collect()
}

fn parse_device_information(xml: &str) -> DeviceInfo {
    let field = |tag: &str| text(xml, tag).map(unescape).unwrap_or_default();
    DeviceInfo {
        manufacturer: field("Manufacturer"),
        model: field("Model"),
        firmware_version: field("FirmwareVersion"),
        serial_number: field("SerialNumber"),
        hardware_id: field("HardwareId"),
    }
}

fn parse_media_uri(xml: &str) -> Option<String> {
    element(xml, "MediaUri")
        .and_then(|m| text(m.inner, "Uri"))
        .map(unescape)
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn parse_number(xml: &str, tag: &str) -> PTZResult<f64> {
    text(xml, tag)
        .and_then(|t| t.parse::<f64>().ok())
        .ok_or_else(|| PTZError::Query(format!("missing or bad <{}>", tag)))
}

fn parse_range(space: &str, axis: &str) -> PTZResult<DeviceRange> {
    let range = element(space, axis)
        .ok_or_else(|| PTZError::Query(format!("position space has no {}", axis)))?;
    DeviceRange::new(parse_number(range.inner, "Min")?, parse_number(range.inner, "Max")?)
}

fn parse_position_space(xml: &str) -> PTZResult<PositionSpace> {
    let pan_tilt = element(xml, "AbsolutePanTiltPositionSpace")
        .ok_or_else(|| PTZError::Query("no absolute pan/tilt position space".to_string()))?;
    let zoom = element(xml, "AbsoluteZoomPositionSpace")
        .ok_or_else(|| PTZError::Query("no absolute zoom position space".to_string()))?;
    Ok(PositionSpace {
        pan: parse_range(pan_tilt.inner, "XRange")?,
        tilt: parse_range(pan_tilt.inner, "YRange")?,
        zoom: parse_range(zoom.inner, "XRange")?,
    })
}

fn parse_status(xml: &str) -> PTZResult<RawStatus> {
    let position = element(xml, "Position")
        .ok_or_else(|| PTZError::Query("no position in PTZ status".to_string()))?;
    let coord = |tag: &str, attr: &str| {
        element(position.inner, tag)
            .and_then(|e| attribute(e.open, attr))
            .and_then(|v| v.parse::<f64>().ok())
    };
    Ok(RawStatus {
        pan: coord("PanTilt", "x"),
        tilt: coord("PanTilt", "y"),
        zoom: coord("Zoom", "x"),
    })
}
