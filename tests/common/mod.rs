//! Shared test utilities: a minimal local HTTP server for REST tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use coinscope::config::GeckoConfig;

/// What the stub answers for a request path (query string stripped).
/// `None` never answers and holds the connection open.
pub type Route = Arc<dyn Fn(&str) -> Option<(u16, String)> + Send + Sync>;

/// A local HTTP/1.1 server answering every request through a [`Route`].
pub struct HttpStub {
    pub base_url: String,
    requests: Arc<AtomicUsize>,
    paths: Arc<Mutex<Vec<String>>>,
}

impl HttpStub {
    pub async fn spawn(route: impl Fn(&str) -> Option<(u16, String)> + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind HTTP stub");
        let addr = listener.local_addr().expect("listener has an address");
        let route: Route = Arc::new(route);
        let requests = Arc::new(AtomicUsize::new(0));
        let paths = Arc::new(Mutex::new(Vec::new()));

        let (counter, seen) = (requests.clone(), paths.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, route.clone(), counter.clone(), seen.clone()));
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
            paths,
        }
    }

    /// Requests received so far, answered or not.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().expect("paths lock poisoned").clone()
    }

    /// A REST config pointing at this stub.
    pub fn config(&self) -> GeckoConfig {
        GeckoConfig {
            rest_base_url: self.base_url.clone(),
            ..GeckoConfig::default()
        }
    }
}

async fn serve(mut stream: TcpStream, route: Route, requests: Arc<AtomicUsize>, paths: Arc<Mutex<Vec<String>>>) {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&head);
    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let path = target.split('?').next().unwrap_or("/").to_string();
    requests.fetch_add(1, Ordering::SeqCst);
    paths.lock().expect("paths lock poisoned").push(target);

    match route(&path) {
        Some((status, body)) => {
            let response = format!(
                "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
        None => {
            // stall until the client gives up on the request
            while let Ok(n) = stream.read(&mut chunk).await {
                if n == 0 {
                    break;
                }
            }
        }
    }
}
