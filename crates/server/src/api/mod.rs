pub mod error;
pub mod files;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod tasks;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
