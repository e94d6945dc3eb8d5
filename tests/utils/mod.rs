use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt; // for `oneshot`

use roomstats::user::directory::{UserDirectory, UserModel};
use roomstats::{api_router, AppState, StatName};

/// One in-memory server instance per test, driven through the real router.
pub struct TestApp {
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self {
            state: AppState::in_memory(),
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn post(&self, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(json) => Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = api_router(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Registers a user in the directory and returns its id.
    pub async fn register_user(&self, id: &str, username: &str) {
        self.state
            .user_directory
            .register_user(UserModel {
                id: id.to_string(),
                username: username.to_string(),
                badge: None,
                gcl: 1,
            })
            .await
            .unwrap();
    }

    /// Records activity and flushes it into the raw event log, as the game
    /// engine's flush cycle would.
    pub async fn record_and_flush(&self, room: &str, user: &str, stat: StatName, amount: i64) {
        self.state.accumulator.increment(room, user, stat, amount);
        self.state
            .accumulator
            .flush(self.state.raw_event_log.as_ref())
            .await
            .unwrap();
    }

    /// Runs a consolidation pass through the console endpoint.
    pub async fn consolidate(&self) {
        let (status, body) = self.post("/api/console/consolidate", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ran"], Value::Bool(true));
    }
}
