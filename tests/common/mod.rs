// Mock dealership backend for integration tests.

#![allow(dead_code)]

use axum::Router;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Bodies received by the mock backend, keyed by endpoint.
#[derive(Clone, Default)]
pub struct Recorder {
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Recorder {
    pub fn record(&self, endpoint: &str, body: Value) {
        self.requests.lock().unwrap().push((endpoint.to_string(), body));
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn bodies(&self, endpoint: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

/// Serves `api` under `/api` on an ephemeral port and returns the base URL.
pub async fn spawn_backend(api: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().nest("/api", api);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api")
}

/// A base URL nothing is listening on.
pub async fn dead_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/api")
}
