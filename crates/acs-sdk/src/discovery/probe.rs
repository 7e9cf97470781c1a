//! HTTP device-info probing

use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::DiscoveryConfig;
use crate::error::{SdkError, SdkResult};

/// Identity fields reported by a device-info endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub serial_number: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
}

/// What a single host:port answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Not one of ours (404, 403, other non-success answers)
    NotDevice,
    /// A device that rejected our credentials
    AuthRequired,
    /// A device that described itself
    Device(DeviceInfo),
}

/// Queries one endpoint for device identity
#[async_trait]
pub trait DeviceProber: Send + Sync {
    /// Errors are per-probe (`SdkError::DiscoveryProbe`) and never fatal to a scan
    async fn probe(&self, ip: IpAddr, port: u16) -> SdkResult<ProbeOutcome>;
}

/// Prober issuing `GET <info_path>?format=json`
pub struct HttpProber {
    client: reqwest::Client,
    info_path: String,
}

impl HttpProber {
    pub fn new(config: &DiscoveryConfig) -> SdkResult<Self> {
        // Devices ship self-signed certificates
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .connect_timeout(config.probe_timeout())
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| SdkError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            info_path: config.info_path.clone(),
        })
    }

    fn probe_url(&self, ip: IpAddr, port: u16) -> SdkResult<Url> {
        let scheme = if port == 443 { "https" } else { "http" };
        let mut url = Url::parse(&format!("{}://{}", scheme, SocketAddr::new(ip, port))).map_err(
            |e| SdkError::DiscoveryProbe {
                endpoint: format!("{}:{}", ip, port),
                reason: e.to_string(),
            },
        )?;
        url.set_path(&self.info_path);
        url.query_pairs_mut().append_pair("format", "json");
        Ok(url)
    }
}

#[async_trait]
impl DeviceProber for HttpProber {
    async fn probe(&self, ip: IpAddr, port: u16) -> SdkResult<ProbeOutcome> {
        let url = self.probe_url(ip, port)?;
        let probe_error = |reason: String| SdkError::DiscoveryProbe {
            endpoint: format!("{}:{}", ip, port),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| probe_error(e.to_string()))?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => Ok(ProbeOutcome::AuthRequired),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(ProbeOutcome::NotDevice),
            s if s.is_success() => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| probe_error(e.to_string()))?;
                Ok(ProbeOutcome::Device(parse_device_info(&body)))
            }
            other => {
                debug!(ip = %ip, port, status = %other, "Unexpected probe status");
                Ok(ProbeOutcome::NotDevice)
            }
        }
    }
}

/// Extract identity from a JSON or XML device-info body
///
/// Unrecognised bodies yield an empty [`DeviceInfo`].
pub fn parse_device_info(body: &str) -> DeviceInfo {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let root = value
            .get("DeviceInfo")
            .or_else(|| value.get("deviceInfo"))
            .unwrap_or(&value);
        let field = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| root.get(*k))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
        };
        return DeviceInfo {
            serial_number: field(&["serialNumber", "SerialNumber", "serial_number"]),
            model: field(&["model", "Model", "deviceModel"]),
            name: field(&["deviceName", "DeviceName", "name"]),
        };
    }

    DeviceInfo {
        serial_number: xml_tag(body, "serialNumber"),
        model: xml_tag(body, "model"),
        name: xml_tag(body, "deviceName"),
    }
}

fn xml_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    let value = body[start..end].trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn prober() -> HttpProber {
        HttpProber::new(&DiscoveryConfig::default()).unwrap()
    }

    async fn probe_server(server: &MockServer) -> SdkResult<ProbeOutcome> {
        let addr = server.address();
        prober().probe(addr.ip(), addr.port()).await
    }

    #[test]
    fn test_parse_json_info() {
        let body = r#"{"DeviceInfo":{"deviceName":"Lobby","serialNumber":"DS-K1T671M20230101","model":"DS-K1T671M"}}"#;
        let info = parse_device_info(body);
        assert_eq!(info.serial_number.as_deref(), Some("DS-K1T671M20230101"));
        assert_eq!(info.model.as_deref(), Some("DS-K1T671M"));
        assert_eq!(info.name.as_deref(), Some("Lobby"));
    }

    #[test]
    fn test_parse_xml_info() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<DeviceInfo version="2.0">
  <deviceName>Gate 2</deviceName>
  <model>DS-K1T341</model>
  <serialNumber>SN-XML-01</serialNumber>
</DeviceInfo>"#;
        let info = parse_device_info(body);
        assert_eq!(info.serial_number.as_deref(), Some("SN-XML-01"));
        assert_eq!(info.model.as_deref(), Some("DS-K1T341"));
        assert_eq!(info.name.as_deref(), Some("Gate 2"));
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_device_info("<html>hello</html>"), DeviceInfo::default());
    }

    #[tokio::test]
    async fn test_probe_device() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ISAPI/System/deviceInfo"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "DeviceInfo": { "serialNumber": "SN-42", "model": "DS-K1T671M" }
            })))
            .mount(&server)
            .await;

        let outcome = probe_server(&server).await.unwrap();
        let ProbeOutcome::Device(info) = outcome else {
            panic!("expected a device");
        };
        assert_eq!(info.serial_number.as_deref(), Some("SN-42"));
    }

    #[tokio::test]
    async fn test_probe_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert_eq!(probe_server(&server).await.unwrap(), ProbeOutcome::AuthRequired);
    }

    #[tokio::test]
    async fn test_probe_not_found_and_forbidden() {
        for status in [403, 404] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
            assert_eq!(probe_server(&server).await.unwrap(), ProbeOutcome::NotDevice);
        }
    }

    #[tokio::test]
    async fn test_probe_timeout_is_probe_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = DiscoveryConfig {
            probe_timeout_ms: 100,
            ..Default::default()
        };
        let addr = server.address();
        let result = HttpProber::new(&config).unwrap().probe(addr.ip(), addr.port()).await;
        assert!(matches!(result, Err(SdkError::DiscoveryProbe { .. })));
    }
}
