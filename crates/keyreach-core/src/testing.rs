use crate::error::TransportError;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone)]
enum Scripted {
    Respond(HttpResponse),
    Fail(TransportError),
    Delay(Duration, HttpResponse),
}

/// Answers requests by `METHOD path`; unknown routes get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: HashMap<String, Scripted>,
    calls: Mutex<Vec<String>>,
}

fn route_key(method: &str, path: &str) -> String {
    format!("{} {}", method, path)
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.routes.insert(
            route_key(method, path),
            Scripted::Respond(HttpResponse::new(status, body)),
        );
        self
    }

    pub fn on_json(self, method: &str, path: &str, status: u16, body: serde_json::Value) -> Self {
        self.on(method, path, status, &body.to_string())
    }

    pub fn failing(mut self, method: &str, path: &str) -> Self {
        self.routes.insert(
            route_key(method, path),
            Scripted::Fail(TransportError::Request {
                url: path.to_string(),
                message: "connection refused".to_string(),
            }),
        );
        self
    }

    pub fn delayed(mut self, method: &str, path: &str, delay: Duration, status: u16) -> Self {
        self.routes.insert(
            route_key(method, path),
            Scripted::Delay(delay, HttpResponse::new(status, "{}")),
        );
        self
    }

    /// Every request seen so far, as `METHOD path`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let key = route_key(request.method.as_str(), &request.path);
        self.calls.lock().unwrap().push(key.clone());
        match self.routes.get(&key).cloned() {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Delay(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Ok(HttpResponse::new(404, "")),
        }
    }
}
