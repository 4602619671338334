// HTTP boundary - axum router, handlers and error mapping

pub mod error;
pub mod handlers;
pub mod metadata;
pub mod server;

pub use error::ApiError;
pub use metadata::Metadata;
pub use server::{router, run_server, AppState, ServerError};
