//! Request assembly and dispatch.
//!
//! # Design
//! `ApiCaller` owns a transport, a base path and an optional error observer.
//! A call goes through two stages:
//! - `build` (synchronous, no I/O): coerce every bucket through the schema,
//!   check required fields, resolve the URL and derive the payload. Any
//!   validation failure returns here, so a request that fails validation is
//!   never sent.
//! - `request` (async): hand the built request to the transport and
//!   normalize the outcome. Non-2xx responses become `TransportFailure`s;
//!   the error observer sees each failure before it is returned unchanged.
//!
//! Compiled schemas are memoized in a `SchemaCache` keyed by the declared
//! field list, so repeated calls with equal schemas share one
//! `TypeDescriptor`.

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::{BindError, TransportFailure};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::params::{Bucket, Params};
use crate::schema::{FieldSpec, Schema, TypeDescriptor};
use crate::template::{display_value, UrlTemplate};

/// Environment variable read by `CallerConfig::from_env`.
pub const BASE_PATH_ENV: &str = "BINDER_BASE_PATH";

/// Observer invoked with every transport failure.
pub type ErrorHandler = Arc<dyn Fn(&TransportFailure) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerConfig {
    /// Prefix prepended verbatim to every URL template.
    pub base_path: String,
}

impl CallerConfig {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Read `BINDER_BASE_PATH`; unset means an empty prefix.
    pub fn from_env() -> Self {
        Self::new(std::env::var(BASE_PATH_ENV).unwrap_or_default())
    }
}

/// Compile-once store of `TypeDescriptor`s.
#[derive(Debug, Default)]
pub struct SchemaCache {
    compiled: DashMap<Vec<FieldSpec>, Arc<TypeDescriptor>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the compiled form of `schema`, compiling it on first use.
    pub fn get_or_compile(&self, schema: &Schema) -> Arc<TypeDescriptor> {
        if let Some(existing) = self.compiled.get(schema.fields()) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .compiled
            .entry(schema.fields().to_vec())
            .or_insert_with(|| {
                tracing::debug!(fields = schema.fields().len(), "compiling schema");
                Arc::new(schema.compile())
            });
        Arc::clone(entry.value())
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

/// Schema-driven REST caller.
pub struct ApiCaller<T> {
    transport: T,
    config: CallerConfig,
    error_handler: Option<ErrorHandler>,
    schemas: SchemaCache,
}

impl<T: Transport> ApiCaller<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, CallerConfig::default())
    }

    pub fn with_config(transport: T, config: CallerConfig) -> Self {
        Self {
            transport,
            config,
            error_handler: None,
            schemas: SchemaCache::new(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.config.base_path
    }

    pub fn set_base_path(&mut self, base_path: impl Into<String>) {
        self.config.base_path = base_path.into();
    }

    /// Install an observer for transport failures. It cannot change the
    /// outcome; a panic inside it is caught and logged.
    pub fn set_error_handler<F>(&mut self, handler: F)
    where
        F: Fn(&TransportFailure) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
    }

    pub fn clear_error_handler(&mut self) {
        self.error_handler = None;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Compiled, shared descriptor for `schema`.
    pub fn compile(&self, schema: &Schema) -> Arc<TypeDescriptor> {
        self.schemas.get_or_compile(schema)
    }

    /// Validate, coerce and assemble a request without sending it.
    ///
    /// Coercion rewrites the values in `params` in place.
    pub fn build(
        &self,
        method: HttpMethod,
        url: &str,
        params: &mut Params,
        schema: Option<&Schema>,
    ) -> Result<HttpRequest, BindError> {
        let desc = schema.map(|schema| self.compile(schema));
        self.build_compiled(method, url, params, desc.as_deref())
    }

    /// Same as `build`, with a descriptor obtained from `compile`.
    pub fn build_compiled(
        &self,
        method: HttpMethod,
        url: &str,
        params: &mut Params,
        desc: Option<&TypeDescriptor>,
    ) -> Result<HttpRequest, BindError> {
        if let Some(desc) = desc {
            normalize_params(params, desc)?;
        }

        let template = UrlTemplate::parse(url);
        let url = format!("{}{}", self.config.base_path, template.render(params.path.as_ref()));

        Ok(HttpRequest {
            method,
            url,
            query: params.query.as_ref().map(query_pairs).unwrap_or_default(),
            headers: params.headers.as_ref().map(header_pairs).unwrap_or_default(),
            body: params.body.as_ref().and_then(body_payload),
        })
    }

    pub async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        params: &mut Params,
        schema: Option<&Schema>,
    ) -> Result<HttpResponse, BindError> {
        let desc = schema.map(|schema| self.compile(schema));
        self.request_compiled(method, url, params, desc.as_deref()).await
    }

    /// Same as `request`, skipping the schema cache lookup.
    pub async fn request_compiled(
        &self,
        method: HttpMethod,
        url: &str,
        params: &mut Params,
        desc: Option<&TypeDescriptor>,
    ) -> Result<HttpResponse, BindError> {
        let request = self.build_compiled(method, url, params, desc)?;
        tracing::debug!(
            method = method.as_str(),
            url = %request.url_with_query(),
            "dispatching request"
        );

        let outcome = match self.transport.send(request).await {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => Err(TransportFailure {
                status: response.status,
                status_text: response.status_text,
                body: response.body,
            }),
            Err(failure) => Err(failure),
        };

        outcome.map_err(|failure| {
            tracing::warn!(
                method = method.as_str(),
                status = failure.status,
                status_text = %failure.status_text,
                "request failed"
            );
            self.notify(&failure);
            BindError::Transport(failure)
        })
    }

    pub async fn get(
        &self,
        url: &str,
        params: &mut Params,
        schema: Option<&Schema>,
    ) -> Result<HttpResponse, BindError> {
        self.request(HttpMethod::Get, url, params, schema).await
    }

    pub async fn post(
        &self,
        url: &str,
        params: &mut Params,
        schema: Option<&Schema>,
    ) -> Result<HttpResponse, BindError> {
        self.request(HttpMethod::Post, url, params, schema).await
    }

    pub async fn put(
        &self,
        url: &str,
        params: &mut Params,
        schema: Option<&Schema>,
    ) -> Result<HttpResponse, BindError> {
        self.request(HttpMethod::Put, url, params, schema).await
    }

    pub async fn patch(
        &self,
        url: &str,
        params: &mut Params,
        schema: Option<&Schema>,
    ) -> Result<HttpResponse, BindError> {
        self.request(HttpMethod::Patch, url, params, schema).await
    }

    pub async fn delete(
        &self,
        url: &str,
        params: &mut Params,
        schema: Option<&Schema>,
    ) -> Result<HttpResponse, BindError> {
        self.request(HttpMethod::Delete, url, params, schema).await
    }

    fn notify(&self, failure: &TransportFailure) {
        let Some(handler) = &self.error_handler else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| handler(failure))).is_err() {
            tracing::warn!(status = failure.status, "error handler panicked");
        }
    }
}

/// Cast every supplied value, then check that all required fields were sent.
fn normalize_params(params: &mut Params, desc: &TypeDescriptor) -> Result<(), BindError> {
    let mut sent = HashSet::new();
    for bucket in params.buckets_mut().into_iter().flatten() {
        let names: Vec<String> = bucket.keys().cloned().collect();
        for name in names {
            desc.get(&name)?.cast(bucket)?;
            sent.insert(name);
        }
    }

    let missing: Vec<String> = desc
        .required()
        .filter(|f| !sent.contains(f.name()))
        .map(|f| f.name().to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BindError::RequiredMissing(missing))
    }
}

/// Arrays expand to repeated keys; `null` is sent as the text `null`.
fn query_pairs(query: &Bucket) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, value) in query {
        match value {
            Value::Array(items) => {
                pairs.extend(items.iter().map(|item| (name.clone(), display_value(item))))
            }
            other => pairs.push((name.clone(), display_value(other))),
        }
    }
    pairs
}

/// Every value is stringified, `null` included.
fn header_pairs(headers: &Bucket) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| (name.clone(), display_value(value)))
        .collect()
}

/// The payload is the value of the first body entry.
fn body_payload(body: &Bucket) -> Option<Value> {
    if body.len() > 1 {
        tracing::warn!(
            keys = ?body.keys().collect::<Vec<_>>(),
            "body bucket has more than one entry; only the first is sent"
        );
    }
    body.values().next().cloned()
}
