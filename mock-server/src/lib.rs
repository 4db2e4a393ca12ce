//! In-memory animal directory speaking the enveloped API protocol.
//!
//! Every endpoint honors the `_format` parameter (`json`, `jsonp`, `xml`).
//! Successful JSON responses wrap the data under `result` next to meta
//! fields; failures carry `code` and an `error` object instead.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Form, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Owner {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Animal {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
}

pub type Db = Arc<RwLock<Vec<Animal>>>;

pub const REX_ID: Uuid = Uuid::from_u128(1);
pub const TOM_ID: Uuid = Uuid::from_u128(2);

type Params = HashMap<String, String>;

fn seed() -> Vec<Animal> {
    vec![
        Animal {
            id: REX_ID,
            kind: "dog".to_string(),
            name: "Rex".to_string(),
            owner: Some(Owner {
                name: "alice".to_string(),
            }),
        },
        Animal {
            id: TOM_ID,
            kind: "cat".to_string(),
            name: "Tom".to_string(),
            owner: None,
        },
    ]
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(seed()));
    Router::new()
        .route("/v1/animals", get(list_animals).post(create_animal))
        .route("/v1/animals/{id}", get(get_animal))
        .route("/v1/motd", get(motd))
        .route("/v1/broken", get(broken))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_animals(State(db): State<Db>, Query(params): Query<Params>) -> Response {
    let animals = db.read().await;
    let kind = params.get("kind").filter(|k| !k.is_empty());
    let items: Vec<&Animal> = animals
        .iter()
        .filter(|a| kind.map_or(true, |k| k.split(',').any(|k| k == a.kind)))
        .collect();
    let body = json!({
        "result": {"total": items.len(), "items": items},
        "page": 1,
    });
    render(&params, StatusCode::OK, body)
}

async fn get_animal(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(params): Query<Params>,
) -> Response {
    let animals = db.read().await;
    let found = Uuid::parse_str(&id)
        .ok()
        .and_then(|id| animals.iter().find(|a| a.id == id));
    match found {
        Some(animal) => render(&params, StatusCode::OK, json!({"result": animal, "took": 1})),
        None => render(
            &params,
            StatusCode::NOT_FOUND,
            json!({
                "code": 404,
                "error": {"type": "itemNotFound", "message": format!("animal {id} not found")},
            }),
        ),
    }
}

async fn create_animal(State(db): State<Db>, Form(form): Form<Params>) -> Response {
    let name = form.get("name").cloned().unwrap_or_default();
    if name.is_empty() {
        return render(
            &form,
            StatusCode::BAD_REQUEST,
            json!({"code": 400, "error": {"type": "paramRequired", "message": "name is required"}}),
        );
    }
    let animal = Animal {
        id: Uuid::new_v4(),
        kind: form.get("kind").cloned().unwrap_or_else(|| "dog".to_string()),
        name,
        owner: form.get("owner").map(|name| Owner { name: name.clone() }),
    };
    db.write().await.push(animal.clone());
    render(&form, StatusCode::CREATED, json!({"result": animal}))
}

async fn motd(Query(params): Query<Params>) -> Response {
    render(&params, StatusCode::OK, json!({"result": "oops"}))
}

async fn broken() -> Response {
    (StatusCode::BAD_GATEWAY, "upstream timed out").into_response()
}

fn render(params: &Params, status: StatusCode, body: Value) -> Response {
    match params.get("_format").map(String::as_str) {
        Some("jsonp") => {
            let callback = params.get("callback").map(String::as_str).unwrap_or("callback");
            (
                status,
                [(header::CONTENT_TYPE, "application/javascript")],
                format!("{callback}({body})"),
            )
                .into_response()
        }
        Some("xml") => (
            status,
            [(header::CONTENT_TYPE, "application/xml")],
            format!("<?xml version=\"1.0\"?><response>{}</response>", to_xml(&body)),
        )
            .into_response(),
        _ => (status, [(header::CONTENT_TYPE, "application/json")], body.to_string()).into_response(),
    }
}

fn to_xml(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("<{k}>{}</{k}>", to_xml(v)))
            .collect(),
        Value::Array(items) => items
            .iter()
            .map(|v| format!("<item>{}</item>", to_xml(v)))
            .collect(),
        Value::String(s) => s
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
        other => other.to_string(),
    }
}
