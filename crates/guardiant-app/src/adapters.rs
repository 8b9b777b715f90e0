//! Platform adapter speaking JSON lines.
//!
//! Each stdin line is one platform event; the runner answers PIN
//! submissions and idle-surface requests on stdout.

use std::sync::Mutex;

use async_trait::async_trait;
use guardiant_core::auth::UnlockOutcome;
use guardiant_core::interfaces::{IdleSurfaceActivator, PositionProvider};
use guardiant_core::security::Position;
use guardiant_crypto::command::SignedCommand;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    Pin {
        pin: String,
    },
    Motion {
        timestamp_ms: u64,
        x: f64,
        y: f64,
        z: f64,
    },
    Location {
        timestamp_ms: u64,
        latitude: f64,
        longitude: f64,
    },
    Foreground {
        app_id: String,
        #[serde(default)]
        window_class: Option<String>,
    },
    Panic {
        #[serde(default)]
        reason: String,
    },
    Command {
        signed: SignedCommand,
    },
    Redrive,
}

/// Lines the runner writes to stdout.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformOutput {
    Unlock { granted: bool },
    GoHome,
}

impl PlatformOutput {
    pub fn unlock(outcome: UnlockOutcome) -> Self {
        PlatformOutput::Unlock {
            granted: outcome.is_granted(),
        }
    }

    pub fn emit(&self) {
        match serde_json::to_string(self) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("Unencodable output: {e}"),
        }
    }
}

/// Asks the platform to show its home surface.
pub struct StdoutActivator;

impl IdleSurfaceActivator for StdoutActivator {
    fn activate_idle_surface(&self) {
        PlatformOutput::GoHome.emit();
    }
}

/// Remembers the latest location fix seen on the event stream.
#[derive(Default)]
pub struct LastKnownPosition {
    last: Mutex<Option<Position>>,
}

impl LastKnownPosition {
    /// Non-finite fixes are ignored so the last usable one stays current.
    pub fn update(&self, position: Position) {
        if !position.is_finite() {
            return;
        }
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(position);
    }
}

#[async_trait]
impl PositionProvider for LastKnownPosition {
    async fn current_position(&self) -> Option<Position> {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_lines() {
        let event: PlatformEvent = serde_json::from_str(r#"{"type":"pin","pin":"1234"}"#).unwrap();
        assert!(matches!(event, PlatformEvent::Pin { ref pin } if pin == "1234"));

        let event: PlatformEvent =
            serde_json::from_str(r#"{"type":"foreground","app_id":"bank.app"}"#).unwrap();
        assert!(matches!(
            event,
            PlatformEvent::Foreground { ref app_id, window_class: None } if app_id == "bank.app"
        ));

        let event: PlatformEvent = serde_json::from_str(r#"{"type":"redrive"}"#).unwrap();
        assert!(matches!(event, PlatformEvent::Redrive));
    }

    #[test]
    fn output_shapes() {
        assert_eq!(
            serde_json::to_string(&PlatformOutput::unlock(UnlockOutcome::Granted)).unwrap(),
            r#"{"unlock":{"granted":true}}"#
        );
        assert_eq!(serde_json::to_string(&PlatformOutput::GoHome).unwrap(), r#""go_home""#);
    }

    #[tokio::test]
    async fn position_tracks_latest_fix() {
        let provider = LastKnownPosition::default();
        assert!(provider.current_position().await.is_none());
        provider.update(Position::new(1.0, 2.0));
        provider.update(Position::new(3.0, 4.0));
        assert_eq!(provider.current_position().await, Some(Position::new(3.0, 4.0)));
        provider.update(Position::new(f64::NAN, 4.0));
        assert_eq!(provider.current_position().await, Some(Position::new(3.0, 4.0)));
    }
}
