use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{net::TcpListener, sync::RwLock};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default)]
    pub status: Vec<String>,
    #[serde(default)]
    pub dates: Vec<String>,
}

#[derive(Deserialize)]
pub struct CreateClient {
    pub name: String,
    pub age: Option<u32>,
    #[serde(default)]
    pub status: Vec<String>,
    #[serde(default)]
    pub dates: Vec<String>,
}

#[derive(Deserialize)]
pub struct UpdateClient {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub status: Option<Vec<String>>,
    pub dates: Option<Vec<String>>,
}

pub struct Store {
    clients: RwLock<BTreeMap<u64, Client>>,
    next_id: AtomicU64,
}

pub type Db = Arc<Store>;

/// Routes live under `/ws`: `clients` is a small CRUD resource and `echo`
/// answers with what it received (method, path, query, headers, body).
pub fn app() -> Router {
    let db: Db = Arc::new(Store {
        clients: RwLock::new(BTreeMap::new()),
        next_id: AtomicU64::new(1),
    });
    Router::new()
        .route("/ws/clients", get(list_clients).post(create_client))
        .route(
            "/ws/clients/{id}",
            get(get_client)
                .put(update_client)
                .patch(update_client)
                .delete(delete_client),
        )
        .route("/ws/echo", any(echo))
        .route("/ws/echo/{*rest}", any(echo))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_clients(State(db): State<Db>) -> Json<Vec<Client>> {
    let clients = db.clients.read().await;
    Json(clients.values().cloned().collect())
}

async fn create_client(
    State(db): State<Db>,
    Json(input): Json<CreateClient>,
) -> (StatusCode, Json<Client>) {
    let client = Client {
        id: db.next_id.fetch_add(1, Ordering::Relaxed),
        name: input.name,
        age: input.age,
        status: input.status,
        dates: input.dates,
    };
    tracing::debug!(id = client.id, "client created");
    db.clients.write().await.insert(client.id, client.clone());
    (StatusCode::CREATED, Json(client))
}

async fn get_client(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<Json<Client>, StatusCode> {
    let clients = db.clients.read().await;
    clients.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_client(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(input): Json<UpdateClient>,
) -> Result<Json<Client>, StatusCode> {
    let mut clients = db.clients.write().await;
    let client = clients.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(name) = input.name {
        client.name = name;
    }
    if let Some(age) = input.age {
        client.age = Some(age);
    }
    if let Some(status) = input.status {
        client.status = status;
    }
    if let Some(dates) = input.dates {
        client.dates = dates;
    }
    Ok(Json(client.clone()))
}

async fn delete_client(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<StatusCode, StatusCode> {
    let mut clients = db.clients.write().await;
    clients.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let headers: serde_json::Map<String, Value> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect();
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    Json(serde_json::json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "headers": headers,
        "body": body,
    }))
}
