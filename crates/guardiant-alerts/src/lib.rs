pub mod backend;
pub mod dispatcher;
pub mod error;
pub mod http;

pub use backend::SecurityBackend;
pub use dispatcher::AlertDispatcher;
pub use error::{BackendError, BackendResult};
pub use http::HttpBackend;
