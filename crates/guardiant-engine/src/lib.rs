pub mod coordinator;
pub mod enforcement;
pub mod error;
pub mod foreground;
pub mod intake;
pub mod provisioning;
pub mod retry;
pub mod runtime;

pub use coordinator::{CoordinatorDeps, SecurityCoordinator};
pub use enforcement::{Decision, EnforcementPolicy, SecuritySnapshot};
pub use error::{EngineError, EngineResult};
pub use foreground::ForegroundChange;
pub use intake::{Intake, IntakeHandle};
pub use runtime::{Engine, Platform};
