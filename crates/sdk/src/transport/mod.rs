//! Transport layer for the start-defender vendor and relay APIs.

pub mod http;

pub use http::HttpTransport;
