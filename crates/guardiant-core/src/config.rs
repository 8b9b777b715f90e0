use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub detectors: DetectorConfig,
    #[serde(default)]
    pub alerts: AlertDeliveryConfig,
    #[serde(default)]
    pub enforcement: EnforcementConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    /// Package identifier of the protecting application itself.
    #[serde(default = "default_self_app_id")]
    pub self_app_id: String,
    /// Directory holding the sealed state file.
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_device_id() -> String {
    "guardiant-device".into()
}
fn default_self_app_id() -> String {
    "com.guardiant.app".into()
}
fn default_state_dir() -> String {
    "data/guardiant".into()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            self_app_id: default_self_app_id(),
            state_dir: default_state_dir(),
        }
    }
}

/// Remote backend connection.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token sent on every call. Empty means "read GUARDIANT_TOKEN".
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8787/".into()
}
fn default_request_timeout_secs() -> u64 {
    15
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bearer_token: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// Token from config, falling back to the `GUARDIANT_TOKEN` env var.
    pub fn resolve_token(&self) -> Option<String> {
        if !self.bearer_token.is_empty() {
            return Some(self.bearer_token.clone());
        }
        std::env::var("GUARDIANT_TOKEN").ok().filter(|t| !t.is_empty())
    }
}

/// Anomaly detector thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Gravitational baseline subtracted from acceleration magnitude (m/s²).
    #[serde(default = "default_gravity_baseline")]
    pub gravity_baseline: f64,
    /// Residual acceleration above which a sample is abnormal (m/s²).
    #[serde(default = "default_motion_threshold")]
    pub motion_threshold: f64,
    /// Displacement above which a fast move is suspicious (metres).
    #[serde(default = "default_speed_distance_m")]
    pub speed_distance_m: f64,
    /// Window below which that displacement is impossible (seconds).
    #[serde(default = "default_speed_window_secs")]
    pub speed_window_secs: f64,
}

fn default_gravity_baseline() -> f64 {
    9.8
}
fn default_motion_threshold() -> f64 {
    25.0
}
fn default_speed_distance_m() -> f64 {
    100.0
}
fn default_speed_window_secs() -> f64 {
    5.0
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            gravity_baseline: default_gravity_baseline(),
            motion_threshold: default_motion_threshold(),
            speed_distance_m: default_speed_distance_m(),
            speed_window_secs: default_speed_window_secs(),
        }
    }
}

/// Alert delivery retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertDeliveryConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_max_attempts() -> u32 {
    8
}

impl Default for AlertDeliveryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Apps that stay reachable under coercion.
#[derive(Debug, Clone, Deserialize)]
pub struct EnforcementConfig {
    #[serde(default = "default_allowed_system_apps")]
    pub allowed_system_apps: Vec<String>,
    #[serde(default = "default_allowed_system_prefixes")]
    pub allowed_system_prefixes: Vec<String>,
}

fn default_allowed_system_apps() -> Vec<String> {
    [
        "com.android.systemui",
        "com.google.android.inputmethod.latin",
        "com.samsung.android.inputmethod",
        "com.android.launcher",
        "com.android.launcher3",
        "com.google.android.apps.nexuslauncher",
        "com.sec.android.app.launcher",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_allowed_system_prefixes() -> Vec<String> {
    vec!["com.android.".into()]
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            allowed_system_apps: default_allowed_system_apps(),
            allowed_system_prefixes: default_allowed_system_prefixes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,
    /// Rejected PINs before a repeated-failure alert (0 = never).
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
    /// Persist attempts before a transition is given up.
    #[serde(default = "default_persist_retries")]
    pub persist_retries: u32,
    #[serde(default = "default_position_timeout_ms")]
    pub position_timeout_ms: u64,
    /// Attempts at fetching the protected-app set after a transition.
    #[serde(default = "default_fetch_attempts")]
    pub fetch_attempts: u32,
}

fn default_intake_capacity() -> usize {
    256
}
fn default_max_failed_attempts() -> u32 {
    5
}
fn default_persist_retries() -> u32 {
    3
}
fn default_position_timeout_ms() -> u64 {
    2_000
}
fn default_fetch_attempts() -> u32 {
    5
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            intake_capacity: default_intake_capacity(),
            max_failed_attempts: default_max_failed_attempts(),
            persist_retries: default_persist_retries(),
            position_timeout_ms: default_position_timeout_ms(),
            fetch_attempts: default_fetch_attempts(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config with fallback chain: explicit path → ./config/default.toml → hardcoded defaults.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Self {
        if let Some(path) = explicit_path {
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {e}", path.display());
                }
            }
        }

        let default_path = Path::new("config/default.toml");
        if default_path.exists() {
            match Self::load(default_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!("Failed to load default config: {e}");
                }
            }
        }

        tracing::info!("Using hardcoded default configuration");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_thresholds() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.detectors.gravity_baseline, 9.8);
        assert_eq!(cfg.detectors.motion_threshold, 25.0);
        assert_eq!(cfg.detectors.speed_distance_m, 100.0);
        assert_eq!(cfg.detectors.speed_window_secs, 5.0);
        assert_eq!(cfg.alerts.max_attempts, 8);
        assert_eq!(cfg.device.self_app_id, "com.guardiant.app");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: AppConfig = toml::from_str(
            "[device]\ndevice_id = \"phone-7\"\n\n[alerts]\nmax_attempts = 3\n",
        )
        .unwrap();
        assert_eq!(cfg.device.device_id, "phone-7");
        assert_eq!(cfg.device.self_app_id, "com.guardiant.app");
        assert_eq!(cfg.alerts.max_attempts, 3);
        assert_eq!(cfg.alerts.base_delay_ms, 1_000);
        assert_eq!(cfg.coordinator.intake_capacity, 256);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardiant.toml");
        std::fs::write(&path, "[backend]\nbase_url = \"https://example.test/\"\n").unwrap();
        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.backend.base_url, "https://example.test/");
    }

    #[test]
    fn missing_explicit_path_falls_back() {
        let cfg = AppConfig::load_or_default(Some(Path::new("/nonexistent/guardiant.toml")));
        assert!(!cfg.device.device_id.is_empty());
    }

    #[test]
    fn explicit_token_wins() {
        let backend = BackendConfig {
            bearer_token: "abc".into(),
            ..BackendConfig::default()
        };
        assert_eq!(backend.resolve_token().as_deref(), Some("abc"));
    }

    #[test]
    fn default_allowlist_has_launchers() {
        let cfg = EnforcementConfig::default();
        assert!(cfg
            .allowed_system_apps
            .iter()
            .any(|a| a == "com.android.launcher3"));
        assert_eq!(cfg.allowed_system_prefixes, vec!["com.android.".to_string()]);
    }
}
