//! Blocking transports that execute `HttpRequest` values.
//!
//! `UreqTransport` is the production transport. `RetryingTransport` wraps any
//! transport with bounded exponential backoff for transport-level failures
//! of `GET` requests; HTTP statuses are returned as data and never retried.

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use thiserror::Error;
use tracing::warn;
use ureq::tls::TlsConfig;

use crate::config::ClientConfig;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Failure to obtain any HTTP response at all.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError(message.into())
    }
}

/// Executes one HTTP round-trip.
///
/// Non-2xx statuses must be returned as `Ok(HttpResponse)`; `Err` is reserved
/// for failures where no response was received.
pub trait Transport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Transport backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Build an agent that returns 4xx/5xx responses as data.
    ///
    /// `verify_tls = false` disables certificate verification, which the
    /// public DSpace demo servers have historically needed.
    pub fn new(verify_tls: bool, timeout: Option<Duration>) -> Self {
        let tls = TlsConfig::builder()
            .disable_verification(!verify_tls)
            .build();
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .tls_config(tls)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.verify_ssl, config.timeout())
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(true, None)
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let headers = request.headers.as_slice();

        let result = match (request.method, request.body.as_deref()) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(url), headers).call(),
            (HttpMethod::Delete, _) => with_headers(self.agent.delete(url), headers).call(),
            (HttpMethod::Post, Some(body)) => {
                with_headers(self.agent.post(url), headers).send(body.as_bytes())
            }
            (HttpMethod::Post, None) => with_headers(self.agent.post(url), headers).send_empty(),
            (HttpMethod::Put, Some(body)) => {
                with_headers(self.agent.put(url), headers).send(body.as_bytes())
            }
            (HttpMethod::Put, None) => with_headers(self.agent.put(url), headers).send_empty(),
        };
        let mut response = result.map_err(|e| TransportError::new(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError::new(format!("reading response body: {e}")))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Retries transport failures of `GET` requests with exponential backoff.
///
/// With `max_elapsed = None` every request is passed straight through.
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    max_elapsed: Option<Duration>,
}

impl<T> RetryingTransport<T> {
    pub fn new(inner: T, max_elapsed: Option<Duration>) -> Self {
        Self { inner, max_elapsed }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T: Transport> Transport for RetryingTransport<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let max_elapsed = match self.max_elapsed {
            Some(max_elapsed) if request.method == HttpMethod::Get => max_elapsed,
            _ => return self.inner.execute(request),
        };

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_elapsed_time(Some(max_elapsed))
            .build();

        backoff::retry(policy, || {
            self.inner.execute(request).map_err(|err| {
                warn!(url = %request.url, error = %err, "transport failure, retrying");
                backoff::Error::transient(err)
            })
        })
        .map_err(|err| match err {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => err,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct Flaky {
        failures_left: Cell<u32>,
        calls: Cell<u32>,
    }

    impl Transport for Flaky {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.set(self.calls.get() + 1);
            if self.failures_left.get() > 0 {
                self.failures_left.set(self.failures_left.get() - 1);
                return Err(TransportError::new("connection reset"));
            }
            Ok(HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: "[]".to_string(),
            })
        }
    }

    fn request(method: HttpMethod) -> HttpRequest {
        HttpRequest {
            method,
            url: "http://localhost/rest/items".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[test]
    fn get_is_retried_until_success() {
        let flaky = Flaky {
            failures_left: Cell::new(2),
            calls: Cell::new(0),
        };
        let transport = RetryingTransport::new(&flaky, Some(Duration::from_secs(10)));
        let response = transport.execute(&request(HttpMethod::Get)).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(flaky.calls.get(), 3);
    }

    #[test]
    fn post_is_never_retried() {
        let flaky = Flaky {
            failures_left: Cell::new(1),
            calls: Cell::new(0),
        };
        let transport = RetryingTransport::new(&flaky, Some(Duration::from_secs(10)));
        assert!(transport.execute(&request(HttpMethod::Post)).is_err());
        assert_eq!(flaky.calls.get(), 1);
    }

    #[test]
    fn disabled_retry_passes_failures_through() {
        let flaky = Flaky {
            failures_left: Cell::new(1),
            calls: Cell::new(0),
        };
        let transport = RetryingTransport::new(&flaky, None);
        let err = transport.execute(&request(HttpMethod::Get)).unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(flaky.calls.get(), 1);
    }
}
