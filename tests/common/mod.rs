#![allow(dead_code)]
//! Scripted `HttpClient` for tests: per-URL response queues, call log,
//! optional latency. The last scripted response for a URL repeats.
use async_trait::async_trait;
use datafetch::fetch::{HttpClient, HttpResponse};
use datafetch::{Error, Result};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(HttpResponse),
    NetworkError,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub at: Instant,
}

#[derive(Debug, Default)]
pub struct ScriptedHttp {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<Call>>,
    latency: Option<Duration>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn script(&self, url: &str, responses: Vec<Scripted>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
    }

    pub fn ok(&self, url: &str, body: &str) {
        self.script(url, vec![Scripted::Respond(HttpResponse::new(200, body))]);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.url == url).count()
    }

    fn next_response(&self, url: &str) -> Scripted {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or(Scripted::Respond(HttpResponse::new(404, "not found"))),
            None => Scripted::Respond(HttpResponse::new(404, "not found")),
        }
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn get(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<HttpResponse> {
        self.calls.lock().unwrap().push(Call {
            url: url.to_string(),
            headers: headers.clone(),
            at: Instant::now(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.next_response(url) {
            Scripted::Respond(response) => Ok(response),
            Scripted::NetworkError => Err(Error::Custom("connection refused".to_string())),
        }
    }
}
