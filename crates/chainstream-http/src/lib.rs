//! chainstream-http — one-shot HTTP request sources for ChainStream.
//!
//! - [`HttpClient`] — `reqwest` client with throttle and retry
//! - [`HttpSource`] — a [`Source`](chainstream_core::Source) that performs one
//!   encoded request per start, pushes the items and closes its provider

pub mod client;
pub mod source;

pub use client::{HttpClient, HttpClientConfig, HttpRequest, RequestTransport};
pub use source::{HttpSource, RequestEncoder};
