#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use survey_client::api::HttpBackend;
use survey_client::auth::{AuthSession, EntryPoint, Navigator};
use survey_client::clock::ManualClock;
use survey_client::config::BackendConfig;
use survey_client::storage::{MemoryStore, StorageScopes};
use tokio::net::TcpListener;

type Rejection = (StatusCode, Json<Value>);

/// Shared state of the in-process survey API.
#[derive(Default)]
pub struct ServerState {
    pub authorizations: Mutex<Vec<Option<String>>>,
    pub created_answers: Mutex<Vec<Value>>,
    pub updated_answers: Mutex<Vec<(i64, Value)>>,
    pub general_data_writes: Mutex<Vec<Value>>,
    /// Answer questions with 403 and a body naming the token.
    pub reject_token: AtomicBool,
    /// Answer questions with a 403 that says nothing about tokens.
    pub forbid: AtomicBool,
    pub reports_delay: Mutex<Option<Duration>>,
    pub stored_answers: Mutex<Vec<Value>>,
}

impl ServerState {
    fn note_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.authorizations.lock().expect("state mutex").push(value);
    }

    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.authorizations.lock().expect("state mutex").clone()
    }
}

async fn categories(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Json<Value> {
    state.note_auth(&headers);
    Json(json!([
        { "id": 1, "nombre": "Liderazgo", "peso": 50, "order": 2 },
        { "id": 2, "name": "Procesos", "weight": 50, "order": 1 }
    ]))
}

async fn questions(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, Rejection> {
    state.note_auth(&headers);
    if state.reject_token.load(Ordering::SeqCst) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "detail": "Token inválido o expirado" })),
        ));
    }
    if state.forbid.load(Ordering::SeqCst) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "detail": "Permiso denegado" })),
        ));
    }
    Ok(Json(json!({
        "data": [
            { "id": 11, "categoryId": 1, "texto": "¿Existe una estrategia?", "order": 1 },
            { "id": 12, "category_id": 1, "text": "¿Se comunica?", "order": 2 },
            { "id": 21, "categoriaId": 2, "text": "¿Hay procesos?", "order": 1 },
            { "id": 22, "categoryId": 2, "text": "¿Se miden?", "order": 2 }
        ]
    })))
}

async fn options() -> Json<Value> {
    Json(json!([
        { "value": 1, "text": "No", "order": 3 },
        { "value": 3, "text": "En Parte", "order": 2 },
        { "value": 5, "text": "Si", "order": 1 }
    ]))
}

async fn missing_general_data() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn create_general_data(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .general_data_writes
        .lock()
        .expect("state mutex")
        .push(body);
    Json(json!({ "data": { "id": 31 } }))
}

async fn update_general_data(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .general_data_writes
        .lock()
        .expect("state mutex")
        .push(body);
    Json(json!({ "id": id }))
}

async fn list_answers(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let form = query
        .get("general_data_id")
        .and_then(|raw| raw.parse::<i64>().ok());
    let rows: Vec<Value> = state
        .stored_answers
        .lock()
        .expect("state mutex")
        .iter()
        .filter(|row| row.get("general_data_id").and_then(Value::as_i64) == form)
        .cloned()
        .collect();
    Json(json!({ "results": rows }))
}

async fn create_answer(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.note_auth(&headers);
    let mut created = state.created_answers.lock().expect("state mutex");
    created.push(body);
    Json(json!({ "data": { "ID": format!("{}", 14 + created.len()) } }))
}

async fn update_answer(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .updated_answers
        .lock()
        .expect("state mutex")
        .push((id, body));
    Json(json!({ "id": id }))
}

async fn reports(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.note_auth(&headers);
    let delay = *state.reports_delay.lock().expect("state mutex");
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let page = query.get("page").cloned().unwrap_or_default();
    Json(json!({
        "items": [{ "id": 1, "company": "Acme SAS", "page": page }],
        "total": 11,
        "page": 2
    }))
}

async fn access_code(Json(body): Json<Value>) -> Result<Json<Value>, Rejection> {
    match body.get("code").and_then(Value::as_str) {
        Some("ABC123") => Ok(Json(json!({
            "token": "resp-token",
            "usuario": { "id": 9, "nombre": "Encuestado" }
        }))),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Código inválido" })),
        )),
    }
}

async fn admin_login() -> Json<Value> {
    Json(json!({ "token": "rpt-token" }))
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/categories/", get(categories))
        .route("/api/questions/", get(questions))
        .route("/api/options/", get(options))
        .route(
            "/api/general-data/",
            get(missing_general_data).post(create_general_data),
        )
        .route("/api/general-data/:id/", put(update_general_data))
        .route("/api/answers/", get(list_answers).post(create_answer))
        .route("/api/answers/:id/", put(update_answer))
        .route("/api/reports/", get(reports))
        .route("/api/auth/access-code/", post(access_code))
        .route("/api/auth/admin-login/", post(admin_login))
        .with_state(state)
}

#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<EntryPoint>>,
}

impl RecordingNavigator {
    pub fn visits(&self) -> Vec<EntryPoint> {
        self.visits.lock().expect("navigator mutex").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, entry_point: EntryPoint) {
        self.visits.lock().expect("navigator mutex").push(entry_point);
    }
}

pub struct TestClient {
    pub base_url: String,
    pub state: Arc<ServerState>,
    pub storage: StorageScopes,
    pub persistent: MemoryStore,
    pub clock: ManualClock,
    pub navigator: Arc<RecordingNavigator>,
    pub auth: Arc<AuthSession>,
    pub backend: Arc<HttpBackend>,
}

impl TestClient {
    pub async fn start() -> Self {
        Self::start_with_timeout(Duration::from_secs(5)).await
    }

    pub async fn start_with_timeout(timeout: Duration) -> Self {
        let state = Arc::new(ServerState::default());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let address = listener.local_addr().expect("local address");
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server runs");
        });

        let persistent = MemoryStore::new();
        let storage = StorageScopes::new(Arc::new(persistent.clone()), Arc::new(MemoryStore::new()));
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
                .single()
                .expect("valid timestamp"),
        );
        let navigator = Arc::new(RecordingNavigator::default());
        let auth = Arc::new(AuthSession::new(
            storage.clone(),
            Arc::new(clock.clone()),
            navigator.clone(),
        ));
        let base_url = format!("http://{address}/api");
        let config = BackendConfig::new(&base_url)
            .expect("base url parses")
            .with_timeout(timeout);
        let backend = Arc::new(HttpBackend::new(&config, auth.clone()).expect("client builds"));

        Self {
            base_url,
            state,
            storage,
            persistent,
            clock,
            navigator,
            auth,
            backend,
        }
    }
}
