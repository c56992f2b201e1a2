//! Transport integration of one exchange.
//!
//! [`ResponseDriver`] feeds response events to a handler, stopping whenever the
//! handler paused the exchange; [`HttpExchange`] runs it next to the request body
//! transfer.

mod http_exchange;
mod response_driver;

pub use http_exchange::HttpExchange;
pub use response_driver::ResponseDriver;
