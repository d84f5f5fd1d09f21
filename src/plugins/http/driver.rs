use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::time::Duration;

use crate::core::error::FetchError;
use crate::core::model::RequestHeaders;
use crate::plugins::registry::{HttpFetch, HttpResponse};

pub struct HttpDriver {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpDriver {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client, user_agent: user_agent.to_string() })
    }

    fn build_headers(&self, extra: &RequestHeaders) -> Result<HeaderMap, FetchError> {
        let mut h = HeaderMap::new();
        let ua = HeaderValue::from_str(&self.user_agent)
            .map_err(|_| FetchError::InvalidHeader { name: USER_AGENT.to_string() })?;
        h.insert(USER_AGENT, ua);
        for (k, v) in extra {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|_| FetchError::InvalidHeader { name: k.clone() })?;
            let value = HeaderValue::from_str(v).map_err(|_| FetchError::InvalidHeader { name: k.clone() })?;
            h.insert(name, value);
        }
        Ok(h)
    }

    fn classify(url: &str, timeout: Duration, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout { url: url.to_string(), timeout_ms: timeout.as_millis() as u64 }
        } else {
            FetchError::Transport { url: url.to_string(), message: e.to_string() }
        }
    }
}

#[async_trait]
impl HttpFetch for HttpDriver {
    async fn get(&self, url: &str, headers: &RequestHeaders, timeout: Duration) -> Result<HttpResponse, FetchError> {
        let headers = self.build_headers(headers)?;

        let resp = self
            .client
            .get(url)
            .headers(headers)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(url, timeout, e))?;

        let status = resp.status().as_u16();
        // the body is read even on error statuses so the connection can be reused
        let body = resp.bytes().await.map_err(|e| Self::classify(url, timeout, e))?;
        Ok(HttpResponse { status, body })
    }
}
