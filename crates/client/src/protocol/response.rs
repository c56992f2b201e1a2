//! HTTP response header handling.
//!
//! The response head travels as `http::Response<()>` with an empty body placeholder;
//! body bytes arrive afterwards as separate [`PayloadItem`](super::PayloadItem)s.

use http::Response;

/// Type alias for HTTP response headers.
pub type ResponseHead = Response<()>;
