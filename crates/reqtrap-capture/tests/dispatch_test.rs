use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request},
    http::StatusCode,
    response::Response,
};
use chrono::Utc;
use reqtrap_capture::{
    dispatch, CaptureConfig, CaptureState, MockDefinition, MockTable, CAPTURED_BODY,
};
use reqtrap_db::entities::{mock_response, request_log};
use reqtrap_db::{
    DbStore, MockResponseInput, NewRequestLog, RecordStore, ResponseRecord, StoreError,
};
use sea_orm::DbErr;

/// In-memory record store
#[derive(Default)]
struct MemoryStore {
    logs: Mutex<Vec<request_log::Model>>,
    mocks: Mutex<Vec<mock_response::Model>>,
}

impl MemoryStore {
    fn logs(&self) -> Vec<request_log::Model> {
        self.logs.lock().unwrap().clone()
    }

    fn push_raw_mock(&self, method: &str, path: &str, status: i32, headers: &str) {
        let mut mocks = self.mocks.lock().unwrap();
        let id = mocks.len() as i64 + 1;
        mocks.push(mock_response::Model {
            id,
            method: method.to_string(),
            path: path.to_string(),
            status,
            headers: headers.to_string(),
            body: None,
            delay: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_request_log(
        &self,
        entry: NewRequestLog,
    ) -> Result<request_log::Model, StoreError> {
        let mut logs = self.logs.lock().unwrap();
        let model = request_log::Model {
            id: logs.len() as i64 + 1,
            method: entry.method,
            path: entry.path,
            query: entry.query,
            headers: entry.headers,
            body: entry.body,
            timestamp: Utc::now(),
            client_ip: entry.client_ip,
            origin: entry.origin,
            response_status: None,
            response_headers: None,
            response_body: None,
            response_time_ms: None,
        };
        logs.push(model.clone());
        Ok(model)
    }

    async fn record_response(&self, id: i64, response: ResponseRecord) -> Result<(), StoreError> {
        let mut logs = self.logs.lock().unwrap();
        let log = logs
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or(StoreError::RequestLogNotFound(id))?;

        log.response_status = Some(response.status as i32);
        log.response_headers = Some(response.headers);
        log.response_body = Some(response.body);
        log.response_time_ms = Some(response.response_time_ms);
        Ok(())
    }

    async fn latest_request_logs(
        &self,
        limit: u64,
    ) -> Result<Vec<request_log::Model>, StoreError> {
        let logs = self.logs.lock().unwrap();
        Ok(logs.iter().rev().take(limit as usize).cloned().collect())
    }

    async fn upsert_mock_response(
        &self,
        input: MockResponseInput,
    ) -> Result<mock_response::Model, StoreError> {
        let mut mocks = self.mocks.lock().unwrap();
        let now = Utc::now();

        if let Some(existing) = mocks
            .iter_mut()
            .find(|m| m.method == input.method && m.path == input.path)
        {
            existing.status = input.status as i32;
            existing.headers = input.headers;
            existing.body = Some(input.body);
            existing.delay = input.delay_secs as i64;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let model = mock_response::Model {
            id: mocks.len() as i64 + 1,
            method: input.method,
            path: input.path,
            status: input.status as i32,
            headers: input.headers,
            body: Some(input.body),
            delay: input.delay_secs as i64,
            created_at: now,
            updated_at: now,
        };
        mocks.push(model.clone());
        Ok(model)
    }

    async fn mock_responses(&self) -> Result<Vec<mock_response::Model>, StoreError> {
        Ok(self.mocks.lock().unwrap().clone())
    }
}

/// Store whose writes fail on demand
struct FlakyStore {
    inner: MemoryStore,
    fail_create: bool,
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn create_request_log(
        &self,
        entry: NewRequestLog,
    ) -> Result<request_log::Model, StoreError> {
        if self.fail_create {
            return Err(StoreError::Database(DbErr::Custom("disk full".to_string())));
        }
        self.inner.create_request_log(entry).await
    }

    async fn record_response(&self, _id: i64, _response: ResponseRecord) -> Result<(), StoreError> {
        Err(StoreError::Database(DbErr::Custom("disk full".to_string())))
    }

    async fn latest_request_logs(
        &self,
        limit: u64,
    ) -> Result<Vec<request_log::Model>, StoreError> {
        self.inner.latest_request_logs(limit).await
    }

    async fn upsert_mock_response(
        &self,
        input: MockResponseInput,
    ) -> Result<mock_response::Model, StoreError> {
        self.inner.upsert_mock_response(input).await
    }

    async fn mock_responses(&self) -> Result<Vec<mock_response::Model>, StoreError> {
        self.inner.mock_responses().await
    }
}

fn capture_state(store: Arc<dyn RecordStore>) -> CaptureState {
    CaptureState::new(store, Arc::new(MockTable::new()), CaptureConfig::default())
}

async fn configure(state: &CaptureState, definition: MockDefinition) {
    state
        .store
        .upsert_mock_response(definition.to_store_input())
        .await
        .unwrap();
    state.mocks.reload(state.store.as_ref()).await.unwrap();
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn request(method: &str, uri: &str) -> Request {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_unmocked_request_is_captured() {
    let store = Arc::new(MemoryStore::default());
    let state = capture_state(store.clone());

    let mut req = Request::builder()
        .method("POST")
        .uri("/webhooks/github?attempt=2")
        .header("Content-Type", "application/json")
        .header("Origin", "https://github.com")
        .body(Body::from(r#"{"zen":"keep it simple"}"#))
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo("192.0.2.10:51000".parse::<SocketAddr>().unwrap()));

    let response = dispatch(&state, req).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(body_string(response).await, CAPTURED_BODY);

    let logs = store.logs();
    assert_eq!(logs.len(), 1);

    let log = &logs[0];
    assert_eq!(log.method, "POST");
    assert_eq!(log.path, "/webhooks/github");
    assert_eq!(log.query.as_deref(), Some("attempt=2"));
    assert_eq!(log.body.as_deref(), Some(r#"{"zen":"keep it simple"}"#));
    assert_eq!(log.client_ip.as_deref(), Some("192.0.2.10"));
    assert_eq!(log.origin.as_deref(), Some("https://github.com"));
    assert!(log.headers.contains(r#""content-type":"application/json""#));
    assert_eq!(log.response_status, Some(200));
    assert_eq!(log.response_headers.as_deref(), Some("{}"));
    assert_eq!(log.response_body.as_deref(), Some(CAPTURED_BODY));
    assert!(log.response_time_ms.is_some());
}

#[tokio::test]
async fn test_mocked_request_answers_verbatim() {
    let store = Arc::new(MemoryStore::default());
    let state = capture_state(store.clone());

    let mut headers = BTreeMap::new();
    headers.insert("X-Brew".to_string(), "earl-grey".to_string());
    configure(
        &state,
        MockDefinition::new(
            "GET",
            "/ping",
            418,
            headers,
            Some("I'm a teapot".to_string()),
            0,
        )
        .unwrap(),
    )
    .await;

    let response = dispatch(&state, request("GET", "/ping")).await;

    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(response.headers().get("x-brew").unwrap(), "earl-grey");
    assert!(response.headers().get("content-type").is_none());
    assert_eq!(body_string(response).await, "I'm a teapot");

    let log = &store.logs()[0];
    assert_eq!(log.response_status, Some(418));
    assert_eq!(log.response_headers.as_deref(), Some(r#"{"X-Brew":"earl-grey"}"#));
    assert_eq!(log.response_body.as_deref(), Some("I'm a teapot"));
}

#[tokio::test]
async fn test_mock_does_not_match_other_method() {
    let store = Arc::new(MemoryStore::default());
    let state = capture_state(store.clone());

    configure(
        &state,
        MockDefinition::new("GET", "/ping", 418, BTreeMap::new(), None, 0).unwrap(),
    )
    .await;

    let response = dispatch(&state, request("POST", "/ping")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, CAPTURED_BODY);
}

#[tokio::test]
async fn test_upsert_replaces_mock_after_reload() {
    let store = Arc::new(MemoryStore::default());
    let state = capture_state(store.clone());

    configure(
        &state,
        MockDefinition::new("GET", "/status", 200, BTreeMap::new(), Some("up".into()), 0).unwrap(),
    )
    .await;
    configure(
        &state,
        MockDefinition::new("GET", "/status", 503, BTreeMap::new(), Some("down".into()), 0)
            .unwrap(),
    )
    .await;

    assert_eq!(state.mocks.len(), 1);

    let response = dispatch(&state, request("GET", "/status")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_string(response).await, "down");
}

#[tokio::test]
async fn test_reserved_paths_are_not_logged() {
    let store = Arc::new(MemoryStore::default());
    let state = capture_state(store.clone());

    for (method, path) in [
        ("GET", "/favicon.ico"),
        ("DELETE", "/requests"),
        ("GET", "/configure-response"),
        ("PUT", "/token"),
    ] {
        let response = dispatch(&state, request(method, path)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT, "{} {}", method, path);
        assert!(body_string(response).await.is_empty());
    }

    assert!(store.logs().is_empty());
}

#[tokio::test]
async fn test_forwarded_for_wins_over_peer() {
    let store = Arc::new(MemoryStore::default());
    let state = capture_state(store.clone());

    let mut req = Request::builder()
        .uri("/")
        .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
        .body(Body::empty())
        .unwrap();
    req.extensions_mut()
        .insert(ConnectInfo("127.0.0.1:9000".parse::<SocketAddr>().unwrap()));

    dispatch(&state, req).await;

    let log = &store.logs()[0];
    assert_eq!(log.client_ip.as_deref(), Some("203.0.113.9"));
    assert_eq!(log.body, None);
}

#[tokio::test]
async fn test_invalid_utf8_body_is_replaced() {
    let store = Arc::new(MemoryStore::default());
    let state = capture_state(store.clone());

    let req = Request::builder()
        .method("PUT")
        .uri("/blob")
        .body(Body::from(vec![b'o', b'k', 0xC3, 0x28]))
        .unwrap();

    let response = dispatch(&state, req).await;
    assert_eq!(response.status(), StatusCode::OK);

    let log = &store.logs()[0];
    assert_eq!(log.body.as_deref(), Some("ok\u{FFFD}("));
    assert_eq!(log.client_ip, None);
}

#[tokio::test]
async fn test_oversized_body_is_refused() {
    let store = Arc::new(MemoryStore::default());
    let state = CaptureState::new(
        store.clone(),
        Arc::new(MockTable::new()),
        CaptureConfig { max_body_bytes: 8 },
    );

    let req = Request::builder()
        .method("POST")
        .uri("/upload")
        .body(Body::from("way more than eight bytes"))
        .unwrap();

    let response = dispatch(&state, req).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(store.logs().is_empty());
}

#[tokio::test]
async fn test_capture_failure_returns_500() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::default(),
        fail_create: true,
    });
    let state = capture_state(store.clone());

    let response = dispatch(&state, request("GET", "/anything")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["code"], "CAPTURE_FAILED");
    assert!(store.inner.logs().is_empty());
}

#[tokio::test]
async fn test_record_failure_keeps_response() {
    let store = Arc::new(FlakyStore {
        inner: MemoryStore::default(),
        fail_create: false,
    });
    let state = capture_state(store.clone());

    let response = dispatch(&state, request("GET", "/anything")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, CAPTURED_BODY);

    let logs = store.inner.logs();
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].is_answered());
}

#[tokio::test]
async fn test_reload_skips_invalid_rows() {
    let store = MemoryStore::default();
    store.push_raw_mock("GET", "/good", 201, "{}");
    store.push_raw_mock("GET", "/bad-headers", 200, "not json");
    store.push_raw_mock("GET", "/bad-status", 42, "{}");

    let table = MockTable::new();
    let count = table.reload(&store).await.unwrap();

    assert_eq!(count, 1);
    assert_eq!(table.lookup("GET", "/good").unwrap().status, 201);
    assert!(table.lookup("GET", "/bad-headers").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_delay_is_applied_and_recorded() {
    let store = Arc::new(MemoryStore::default());
    let state = capture_state(store.clone());

    configure(
        &state,
        MockDefinition::new("GET", "/slow", 200, BTreeMap::new(), Some("late".into()), 3).unwrap(),
    )
    .await;

    let start = tokio::time::Instant::now();
    let response = dispatch(&state, request("GET", "/slow")).await;

    assert!(start.elapsed() >= Duration::from_secs(3));
    assert_eq!(body_string(response).await, "late");
    assert!(store.logs()[0].response_time_ms.unwrap() >= 3000);
}

#[tokio::test(start_paused = true)]
async fn test_delayed_request_does_not_block_others() {
    let store = Arc::new(MemoryStore::default());
    let state = capture_state(store.clone());

    configure(
        &state,
        MockDefinition::new("GET", "/slow", 200, BTreeMap::new(), None, 5).unwrap(),
    )
    .await;

    let slow_state = state.clone();
    let slow = tokio::spawn(async move { dispatch(&slow_state, request("GET", "/slow")).await });
    tokio::task::yield_now().await;

    let start = tokio::time::Instant::now();
    let fast = dispatch(&state, request("GET", "/fast")).await;

    assert_eq!(fast.status(), StatusCode::OK);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!slow.is_finished());

    let slow = slow.await.unwrap();
    assert_eq!(slow.status(), StatusCode::OK);
    assert_eq!(store.logs().len(), 2);
}

#[tokio::test]
async fn test_mock_matches_percent_decoded_path() {
    let store = Arc::new(MemoryStore::default());
    let state = capture_state(store.clone());

    configure(
        &state,
        MockDefinition::new(
            "GET",
            "/hello world",
            418,
            BTreeMap::new(),
            Some("spaced".into()),
            0,
        )
        .unwrap(),
    )
    .await;

    let response = dispatch(&state, request("GET", "/hello%20world")).await;
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(body_string(response).await, "spaced");

    let response = dispatch(&state, request("GET", "/caf%C3%A9")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let logs = store.logs();
    assert_eq!(logs[0].path, "/hello world");
    assert_eq!(logs[1].path, "/caf\u{e9}");
}

#[tokio::test]
async fn test_encoded_reserved_path_is_not_logged() {
    let store = Arc::new(MemoryStore::default());
    let state = capture_state(store.clone());

    let response = dispatch(&state, request("GET", "/fav%69con.ico")).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(store.logs().is_empty());
}

#[tokio::test]
async fn test_bodyless_request_captured_in_database() {
    let db = reqtrap_db::connect("sqlite::memory:").await.unwrap();
    reqtrap_db::migrate(&db).await.unwrap();
    let store = Arc::new(DbStore::new(db));
    let state = capture_state(store.clone());

    // No body, no Origin, no ConnectInfo
    let response = dispatch(&state, request("GET", "/ping")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, CAPTURED_BODY);

    let logs = store.latest_request_logs(10).await.unwrap();
    assert_eq!(logs.len(), 1);

    let log = &logs[0];
    assert_eq!(log.path, "/ping");
    assert_eq!(log.query, None);
    assert_eq!(log.body, None);
    assert_eq!(log.client_ip, None);
    assert_eq!(log.origin, None);
    assert!(log.is_answered());
    assert_eq!(log.response_status, Some(200));
    assert_eq!(log.response_headers.as_deref(), Some("{}"));
    assert_eq!(log.response_body.as_deref(), Some(CAPTURED_BODY));
}
