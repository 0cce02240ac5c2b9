#![allow(unreachable_pub)]

mod api_error;
mod error;
mod file;
mod method;
mod request;
mod response;

pub use api_error::{ApiError, ApiErrorPayload, ErrorNode, HttpError};
pub use error::ErrorKind;
pub use file::File;
pub use method::Method;
pub use request::{Body, Request};
pub(crate) use request::normalize_endpoint;
pub use response::ResponseBody;

/// The tollbooth `Result` type
pub type Result<T> = std::result::Result<T, crate::ErrorKind>;
