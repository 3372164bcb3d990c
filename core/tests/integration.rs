//! End-to-end binding against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port and drives `ApiCaller` through a
//! `Transport` backed by ureq. ureq is blocking, so each send runs on
//! tokio's blocking pool; the caller itself stays async.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use binder_core::{
    ApiCaller, BindError, CallerConfig, FieldSpec, HttpMethod, HttpRequest, HttpResponse, Params,
    ScalarType, Schema, Transport, TransportFailure,
};
use serde_json::{json, Value};

struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Disables ureq's status-code-as-error behavior so 4xx/5xx responses
    /// come back as data and the caller decides what a failure is.
    fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || execute(&agent, request))
            .await
            .map_err(|e| TransportFailure::new(0, e.to_string()))?
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder
}

fn send_json(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<String>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) => builder.content_type("application/json").send(body.as_bytes()),
        None => builder.send_empty(),
    }
}

/// Execute an `HttpRequest` with ureq and return the response as data.
fn execute(agent: &ureq::Agent, req: HttpRequest) -> Result<HttpResponse, TransportFailure> {
    let target = req.url_with_query();
    let body = req.body.as_ref().map(Value::to_string);

    let result = match req.method {
        HttpMethod::Get => with_headers(agent.get(&target), &req.headers).call(),
        HttpMethod::Delete => with_headers(agent.delete(&target), &req.headers).call(),
        HttpMethod::Post => send_json(with_headers(agent.post(&target), &req.headers), body),
        HttpMethod::Put => send_json(with_headers(agent.put(&target), &req.headers), body),
        HttpMethod::Patch => send_json(with_headers(agent.patch(&target), &req.headers), body),
    };
    let mut response = result.map_err(|e| TransportFailure::new(0, e.to_string()))?;

    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
    let text = response.body_mut().read_to_string().unwrap_or_default();
    let body = if text.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };

    Ok(HttpResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body,
    })
}

/// Start the mock server on a random port and return its `/ws` base path.
fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}/ws")
}

fn client_schema() -> Schema {
    Schema::new(vec![
        FieldSpec::new("name", ScalarType::String).required(),
        FieldSpec::new("id", ScalarType::Integer).required(),
        FieldSpec::new("status", ScalarType::String).array(),
        FieldSpec::new("dates", ScalarType::Date).array(),
        FieldSpec::new("x-trace", ScalarType::String),
    ])
    .unwrap()
}

#[tokio::test]
async fn crud_lifecycle() {
    let mut api = ApiCaller::with_config(UreqTransport::new(), CallerConfig::new(start_server()));
    let last_failure = Arc::new(AtomicU16::new(0));
    let seen = Arc::clone(&last_failure);
    api.set_error_handler(move |failure| seen.store(failure.status, Ordering::SeqCst));

    let id_only = Schema::new(vec![FieldSpec::new("id", ScalarType::Integer).required()]).unwrap();

    // Step 1: list is empty.
    let res = api.get("/clients", &mut Params::new(), None).await.unwrap();
    assert_eq!(res.status, 200);
    assert_eq!(res.body, json!([]));

    // Step 2: create.
    let mut params = Params::new().body("client", json!({"name": "Juan", "age": 25}));
    let res = api.post("/clients", &mut params, None).await.unwrap();
    assert_eq!(res.status, 201);
    assert_eq!(res.body["name"], "Juan");
    let id = res.body["id"].as_u64().unwrap();

    // Step 3: get with a string id coerced to an integer.
    let mut params = Params::new().path("id", id.to_string());
    let res = api.get("/clients/:id", &mut params, Some(&id_only)).await.unwrap();
    assert_eq!(res.body["age"], 25);
    assert_eq!(params.path.unwrap()["id"], json!(id));

    // Step 4: patch.
    let mut params = Params::new().path("id", id).body("changes", json!({"age": 26}));
    let res = api.patch("/clients/:id", &mut params, None).await.unwrap();
    assert_eq!(res.body["name"], "Juan");
    assert_eq!(res.body["age"], 26);

    // Step 5: put.
    let mut params = Params::new().path("id", id).body("changes", json!({"name": "Ana"}));
    let res = api.put("/clients/:id", &mut params, None).await.unwrap();
    assert_eq!(res.body["name"], "Ana");

    // Step 6: delete.
    let res = api.delete("/clients/:id", &mut Params::new().path("id", id), None).await.unwrap();
    assert_eq!(res.status, 204);
    assert_eq!(last_failure.load(Ordering::SeqCst), 0);

    // Step 7: get after delete fails and the handler saw it.
    let err = api
        .get("/clients/:id", &mut Params::new().path("id", id), None)
        .await
        .unwrap_err();
    let failure = err.transport().expect("transport failure");
    assert_eq!(failure.status, 404);
    assert_eq!(failure.status_text, "Not Found");
    assert_eq!(last_failure.load(Ordering::SeqCst), 404);
}

#[tokio::test]
async fn echo_shows_bound_request() {
    let api = ApiCaller::with_config(UreqTransport::new(), CallerConfig::new(start_server()));
    let schema = client_schema();

    let mut params = Params::new()
        .path("id", "7")
        .query("name", "x")
        .query("status", "new")
        .header("x-trace", 42)
        .body("dates", json!([12345, "12/24/2019", "2019-10-22"]));
    let res = api.post("/echo/clients/:id", &mut params, Some(&schema)).await.unwrap();

    let dates = json!([
        "1970-01-01T00:00:12.345Z",
        "2019-12-24T00:00:00.000Z",
        "2019-10-22T00:00:00.000Z"
    ]);
    assert_eq!(res.body["method"], "POST");
    assert_eq!(res.body["path"], "/ws/echo/clients/7");
    assert_eq!(res.body["query"], "name=x&status=new");
    assert_eq!(res.body["headers"]["x-trace"], "42");
    assert_eq!(res.body["body"], dates);
}

#[tokio::test]
async fn validation_failure_sends_nothing() {
    let api = ApiCaller::with_config(UreqTransport::new(), CallerConfig::new(start_server()));
    let schema = client_schema();

    let err = api
        .post("/clients", &mut Params::new().body("id", 1), Some(&schema))
        .await
        .unwrap_err();
    assert!(matches!(err, BindError::RequiredMissing(_)));

    let res = api.get("/clients", &mut Params::new(), None).await.unwrap();
    assert_eq!(res.body, json!([]));
}
