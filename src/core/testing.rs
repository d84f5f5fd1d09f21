//! In-memory `HttpFetch` with scripted responses for unit tests.

use crate::core::error::FetchError;
use crate::core::model::RequestHeaders;
use crate::plugins::registry::{HttpFetch, HttpResponse};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Reply = Result<HttpResponse, FetchError>;

#[derive(Default)]
pub(crate) struct ScriptedFetch {
    /// One-shot replies, consumed before `steady`.
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    steady: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<(String, RequestHeaders)>>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedFetch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_latency(latency: Duration) -> Self {
        Self { latency: Some(latency), ..Self::default() }
    }

    pub(crate) fn serve(&self, url: &str, status: u16, body: impl Into<Bytes>) {
        self.steady
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(HttpResponse { status, body: body.into() }));
    }

    pub(crate) fn serve_text(&self, url: &str, body: &str) {
        self.serve(url, 200, body.to_string());
    }

    pub(crate) fn enqueue(&self, url: &str, reply: Reply) {
        self.queued.lock().unwrap().entry(url.to_string()).or_default().push_back(reply);
    }

    pub(crate) fn enqueue_status(&self, url: &str, status: u16) {
        self.enqueue(url, Ok(HttpResponse { status, body: Bytes::new() }));
    }

    pub(crate) fn requests_for(&self, url: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|(u, _)| u == url).count()
    }

    pub(crate) fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn last_headers(&self) -> Option<RequestHeaders> {
        self.requests.lock().unwrap().last().map(|(_, h)| h.clone())
    }
}

#[async_trait]
impl HttpFetch for ScriptedFetch {
    async fn get(&self, url: &str, headers: &RequestHeaders, _timeout: Duration) -> Result<HttpResponse, FetchError> {
        self.requests.lock().unwrap().push((url.to_string(), headers.clone()));
        if let Some(latency) = self.latency {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);
            tokio::time::sleep(latency).await;
        }
        let queued = self.queued.lock().unwrap().get_mut(url).and_then(VecDeque::pop_front);
        if let Some(reply) = queued {
            return reply;
        }
        match self.steady.lock().unwrap().get(url) {
            Some(reply) => reply.clone(),
            None => Ok(HttpResponse { status: 404, body: Bytes::new() }),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
