//! Shared loopback HTTP fixture for integration tests: an axum server on an
//! ephemeral port with a per-path request counter, so tests can assert
//! exactly how many fetch attempts an endpoint received.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::Router;
use tokio::net::TcpListener;

pub struct TestServer {
    base_url: String,
    request_counts: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestServer {
    pub async fn start(router: Router) -> Self {
        let request_counts = Arc::new(Mutex::new(HashMap::new()));
        let counts = request_counts.clone();

        let app = router.layer(axum::middleware::from_fn(
            move |req: axum::extract::Request, next: axum::middleware::Next| {
                let counts = counts.clone();
                async move {
                    let path = req.uri().path().to_string();
                    if let Ok(mut counts) = counts.lock() {
                        *counts.entry(path).or_insert(0) += 1;
                    }
                    next.run(req).await
                }
            },
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            request_counts,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.request_counts
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.request_counts.lock().unwrap().values().sum()
    }
}

/// A minimal valid PNG header plus payload; enough for a non-zero body with
/// an image-looking magic number.
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0u8; 64]);
    bytes
}
