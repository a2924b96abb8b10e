pub mod bigquery;
pub mod error;
pub mod pubsub;
pub mod session;
pub mod storage;

pub use bigquery::{BigQueryClient, InsertRow, TableFieldSchema, TableRef};
pub use error::{GcpError, Result};
pub use pubsub::PubSubClient;
pub use session::GcpSession;
pub use storage::StorageClient;
