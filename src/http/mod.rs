//! HTTP support
//!
//! The HTTP request type and declarative HTTP flows built from suite files.

pub mod flow;
pub mod request;

pub use flow::{HttpFlow, HttpFlowFactory, HttpFlowSpec, HttpStep};
pub use request::{
    DEFAULT_TIMEOUT, Durations, HttpBody, HttpParams, HttpRequest, HttpRequestOptions,
    create_http_client,
};
