//! HTTPS client for the security backend.
//!
//! Every endpoint is a POST taking `{"data": {...}}` and answering
//! `{"result": {...}}`, authenticated with a per-call bearer token.

use std::time::Duration;

use async_trait::async_trait;
use guardiant_core::alert::{Alert, AlertPayload};
use guardiant_core::config::BackendConfig;
use guardiant_core::security::{ProtectedApp, ProtectedAppSet, TamperKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backend::SecurityBackend;
use crate::error::{BackendError, BackendResult};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
const DURESS_REASON: &str = "Security PIN used - coercion detected";

/// App entry as the backend names its fields.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireApp {
    app_name: String,
    package_name: String,
}

#[derive(Debug, Deserialize)]
struct AppsResult {
    #[serde(default)]
    apps: Vec<WireApp>,
}

pub struct HttpBackend {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.clone(),
            token: config.resolve_token(),
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    async fn call(&self, endpoint: &str, data: Value, idempotency_key: Option<&str>) -> BackendResult<Value> {
        let mut req = self.client.post(self.url(endpoint)).json(&json!({ "data": data }));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(key) = idempotency_key {
            req = req.header(IDEMPOTENCY_HEADER, key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut envelope: Value = resp.json().await?;
        let result = envelope
            .get_mut("result")
            .map(Value::take)
            .ok_or_else(|| BackendError::Protocol(format!("{endpoint}: missing result")))?;

        if result.get("success").and_then(Value::as_bool) == Some(false) {
            let message = result
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("request refused");
            return Err(BackendError::Rejected(format!("{endpoint}: {message}")));
        }
        Ok(result)
    }
}

/// Endpoint and `data` body carrying an alert.
pub fn alert_request(alert: &Alert) -> (&'static str, Value) {
    let position = alert.payload.position();
    let latitude = position.map(|p| p.latitude);
    let longitude = position.map(|p| p.longitude);
    let id = alert.id.as_str();

    match &alert.payload {
        AlertPayload::AbnormalMovement { acceleration, .. } => (
            "reportAbnormalMovement",
            json!({
                "latitude": latitude,
                "longitude": longitude,
                "accelerationValue": acceleration,
                "clientAlertId": id,
            }),
        ),
        AlertPayload::SuspiciousSpeed {
            speed_mps,
            distance_m,
            elapsed_secs,
            ..
        } => (
            "reportSuspiciousSpeed",
            json!({
                "latitude": latitude,
                "longitude": longitude,
                "calculatedSpeed": speed_mps,
                "distance": distance_m,
                "timeDiff": elapsed_secs,
                "clientAlertId": id,
            }),
        ),
        payload => {
            let reason = match payload {
                AlertPayload::Panic { reason, .. } => reason.clone(),
                AlertPayload::TamperAttempt { app_id, surface } => {
                    let what = match surface {
                        TamperKind::UninstallAttempt => "uninstall attempt",
                        TamperKind::DeviceAdminSettings => "device admin settings opened",
                    };
                    format!("Tamper: {what} ({app_id})")
                }
                AlertPayload::RepeatedPinFailures { attempts } => {
                    format!("{attempts} consecutive failed unlock attempts")
                }
                _ => DURESS_REASON.to_string(),
            };
            (
                "triggerPanicButton",
                json!({
                    "latitude": latitude,
                    "longitude": longitude,
                    "reason": reason,
                    "clientAlertId": id,
                }),
            )
        }
    }
}

#[async_trait]
impl SecurityBackend for HttpBackend {
    async fn fetch_protected_apps(&self) -> BackendResult<ProtectedAppSet> {
        let result = self.call("getProtectedApps", json!({}), None).await?;
        let parsed: AppsResult =
            serde_json::from_value(result).map_err(|e| BackendError::Protocol(e.to_string()))?;
        Ok(ProtectedAppSet::from_apps(
            parsed
                .apps
                .into_iter()
                .map(|a| ProtectedApp::new(a.package_name, a.app_name)),
        ))
    }

    async fn deliver_alert(&self, alert: &Alert) -> BackendResult<()> {
        let (endpoint, data) = alert_request(alert);
        self.call(endpoint, data, Some(alert.id.as_str())).await?;
        Ok(())
    }

    async fn save_protected_apps(&self, apps: &ProtectedAppSet) -> BackendResult<()> {
        let apps: Vec<WireApp> = apps
            .iter()
            .map(|a| WireApp {
                app_name: a.display_name.clone(),
                package_name: a.identifier.clone(),
            })
            .collect();
        self.call("saveProtectedApps", json!({ "apps": apps }), None)
            .await?;
        Ok(())
    }

    async fn set_protection_level(&self, level: &str) -> BackendResult<()> {
        self.call("setProtectionLevel", json!({ "level": level }), None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardiant_core::alert::AlertId;
    use guardiant_core::security::Position;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one HTTP request, answer with `status` and `body`, and hand
    /// back the raw request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = sock.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let len = text[..split]
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= split + 4 + len {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(reply.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}/"), handle)
    }

    fn backend(base_url: String) -> HttpBackend {
        HttpBackend::new(&BackendConfig {
            base_url,
            bearer_token: "tok-1".into(),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn duress_goes_to_panic_endpoint() {
        let alert = Alert::new(
            AlertId::new("dev", 4),
            AlertPayload::DuressUnlock {
                position: Some(Position::new(40.0, -3.0)),
            },
        );
        let (endpoint, data) = alert_request(&alert);
        assert_eq!(endpoint, "triggerPanicButton");
        assert_eq!(data["latitude"], 40.0);
        assert_eq!(data["reason"], DURESS_REASON);
        assert_eq!(data["clientAlertId"], "dev:4");
    }

    #[test]
    fn speed_alert_fields() {
        let alert = Alert::new(
            AlertId::new("dev", 5),
            AlertPayload::SuspiciousSpeed {
                position: None,
                speed_mps: 50.0,
                distance_m: Some(150.0),
                elapsed_secs: Some(3.0),
            },
        );
        let (endpoint, data) = alert_request(&alert);
        assert_eq!(endpoint, "reportSuspiciousSpeed");
        assert_eq!(data["calculatedSpeed"], 50.0);
        assert_eq!(data["distance"], 150.0);
        assert_eq!(data["timeDiff"], 3.0);
        assert!(data["latitude"].is_null());
    }

    #[tokio::test]
    async fn fetches_apps_through_envelope() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"result":{"apps":[{"appName":"Bank","packageName":"bank.app"}]}}"#,
        )
        .await;
        let apps = backend(url).fetch_protected_apps().await.unwrap();
        assert!(apps.contains("bank.app"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /getProtectedApps"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer tok-1"));
        assert!(request.contains(r#"{"data":{}}"#));
    }

    #[tokio::test]
    async fn alert_carries_idempotency_key() {
        let (url, server) =
            serve_once("200 OK", r#"{"result":{"success":true,"message":"ok"}}"#).await;
        let alert = Alert::new(
            AlertId::new("dev", 9),
            AlertPayload::RepeatedPinFailures { attempts: 5 },
        );
        backend(url).deliver_alert(&alert).await.unwrap();

        let request = server.await.unwrap().to_ascii_lowercase();
        assert!(request.contains("idempotency-key: dev:9"));
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let (url, _server) = serve_once("503 Service Unavailable", "{}").await;
        let err = backend(url).fetch_protected_apps().await.unwrap_err();
        assert!(err.is_transient(), "{err}");
    }

    #[tokio::test]
    async fn unsuccessful_result_is_rejected() {
        let (url, _server) =
            serve_once("200 OK", r#"{"result":{"success":false,"message":"bad level"}}"#).await;
        let err = backend(url).set_protection_level("extreme").await.unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
        assert!(!err.is_transient());
    }
}
