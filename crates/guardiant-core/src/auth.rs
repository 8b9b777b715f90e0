use serde::{Deserialize, Serialize};

/// Which stored credential a PIN matched.
///
/// Only the coordinator ever sees this value. Everything facing the holder
/// of the device gets an [`UnlockOutcome`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinKind {
    Normal,
    Duress,
}

/// What the unlock surface is told after a PIN submission.
///
/// A normal and a duress unlock both produce `Granted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Granted,
    Denied,
}

impl UnlockOutcome {
    pub fn is_granted(self) -> bool {
        matches!(self, UnlockOutcome::Granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&PinKind::Duress).unwrap(), "\"duress\"");
        assert_eq!(serde_json::to_string(&PinKind::Normal).unwrap(), "\"normal\"");
    }

    #[test]
    fn unlock_outcome_granted() {
        assert!(UnlockOutcome::Granted.is_granted());
        assert!(!UnlockOutcome::Denied.is_granted());
    }
}
