pub mod coercion;
pub mod error;
pub mod memory;
pub mod sealed_file;
pub mod state;
pub mod traits;

pub use coercion::CoercionStateStore;
pub use error::{StoreError, StoreResult};
pub use state::SecurityState;
pub use traits::SecureKeyValueStore;
