//! Declarative request-parameter binder for REST calls.
//!
//! # Overview
//! Given a URL template such as `/clients/:id`, a parameter bag split into
//! path/query/headers/body buckets and an optional field schema, the binder
//! coerces every value to its declared type, checks that required fields
//! are present, resolves the URL and hands the finished request to a
//! host-provided `Transport`.
//!
//! # Design
//! - `ApiCaller::build` is pure: all validation happens there, so a request
//!   that fails validation never reaches the transport.
//! - `ApiCaller::request` and the per-verb helpers are the async surface;
//!   they suspend only while the transport runs.
//! - Schemas are plain values; their compiled `TypeDescriptor` is memoized
//!   per caller and shared through `Arc`.
//! - Buckets are insertion-ordered JSON maps, so query strings and
//!   "missing field" messages are deterministic.

mod coerce;

pub mod client;
pub mod error;
pub mod http;
pub mod params;
pub mod schema;
pub mod template;

pub use client::{ApiCaller, CallerConfig, ErrorHandler, SchemaCache};
pub use error::{BindError, TransportFailure};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use params::Params;
pub use schema::{FieldDescriptor, FieldSpec, ScalarType, Schema, TypeDescriptor};
