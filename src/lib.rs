pub mod cli;
pub mod config;
pub mod contract;
pub mod defaults;
pub mod editable;
pub mod error;
pub mod load_config;
pub mod payload;
pub mod reconcile;
pub mod registration;
pub mod server;
pub mod session;
pub mod store;
pub mod watermark;

pub use contract::{RemoteApi, SessionFactory};
pub use defaults::Baseline;
pub use error::{RemoteError, ServiceError, WatermarkError};
pub use server::{router, AppState};
pub use store::{EventRecord, EventStore};
pub use watermark::Watermark;

#[cfg(any(test, feature = "test-export-mocks"))]
pub use contract::{MockRemoteApi, MockSessionFactory};
