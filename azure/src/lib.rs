mod auth;
pub use auth::{Auth, Credentials, TokenProvider};

mod error;
pub use error::{ApiError, ApiErrorKind};

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub mod lro;

pub mod management;

mod response;
pub use response::{Body, Response};

#[allow(clippy::declare_interior_mutable_const)] // Clippy doesn't like const http::HeaderValue
const APPLICATION_JSON: http_common::HeaderValue = http_common::HeaderValue::from_static("application/json; charset=utf-8");
