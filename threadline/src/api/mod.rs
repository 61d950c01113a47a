mod backend;
mod client;
mod error;
pub mod mock;

pub use backend::CommentsBackend;
pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use mock::MockBackend;
