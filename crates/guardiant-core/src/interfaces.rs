//! Local capabilities consumed by the core.
//!
//! Platform adapters implement these; the core never reaches for a
//! process-wide singleton.

use async_trait::async_trait;

use crate::security::Position;

/// Returns the device to its idle/home surface.
///
/// Implementations must not show any dialog, toast, or user-visible log.
pub trait IdleSurfaceActivator: Send + Sync {
    fn activate_idle_surface(&self);
}

/// Best-effort source of the current device position.
#[async_trait]
pub trait PositionProvider: Send + Sync {
    async fn current_position(&self) -> Option<Position>;
}
