pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod sse;
pub mod state;
pub mod types;
pub mod websocket;

pub use auth::AdminAuth;
pub use error::{ApiError, ApiResult};
pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use routes::create_router;
pub use state::AppState;
