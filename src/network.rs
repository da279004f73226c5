//! Outbound request interception.
//!
//! Wraps the three request primitives the host exposes: an async fetch, a
//! stateful open/send pair, and a one-shot best-effort beacon. Requests to
//! blocklisted hosts are short-circuited with a synthetic success so callers
//! never enter an error loop; the suppression notification carries only the
//! host, never the full URL.

use crate::config::NetworkConfig;
use crate::notify::Notifier;
use async_trait::async_trait;
use tracing::{debug, trace};
use url::Url;

/// Errors raised on the request path
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("URL has no host")]
    MissingHost,

    #[error("backend error: {0}")]
    Backend(String),
}

/// Minimal response shape callers expect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    /// The synthetic short-circuit response
    pub fn empty_success() -> Self {
        Self {
            status: 200,
            body: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The underlying transport, replaceable at initialization
#[async_trait(?Send)]
pub trait NetworkBackend {
    async fn fetch(&mut self, url: &Url) -> Result<Response, NetworkError>;

    /// Synchronous transmission for the open/send pair
    fn transmit(&mut self, url: &Url, body: Option<&str>) -> Result<Response, NetworkError>;

    /// Best-effort one-shot delivery; true means queued
    fn send_beacon(&mut self, url: &Url, payload: &[u8]) -> bool;
}

/// A request opened but not yet sent; the block decision is fixed at open
#[derive(Debug)]
pub struct OutboundRequest {
    method: String,
    url: Url,
    blocked: bool,
}

impl OutboundRequest {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Exact or suffix match against a host blocklist
pub fn host_blocked(host: &str, blocklist: &[String]) -> bool {
    blocklist
        .iter()
        .any(|b| host == b || host.ends_with(&format!(".{b}")))
}

/// Blocklist gate in front of a `NetworkBackend`
pub struct NetworkInterceptor<B> {
    backend: B,
    blocked_hosts: Vec<String>,
    notifier: Notifier,
}

impl<B: NetworkBackend> NetworkInterceptor<B> {
    pub fn new(backend: B, config: &NetworkConfig, notifier: Notifier) -> Self {
        Self {
            backend,
            blocked_hosts: config.blocked_hosts.clone(),
            notifier,
        }
    }

    pub fn is_blocked(&self, host: &str) -> bool {
        host_blocked(host, &self.blocked_hosts)
    }

    fn parse(url: &str) -> Result<(Url, String), NetworkError> {
        let url = Url::parse(url)?;
        let host = url
            .host_str()
            .ok_or(NetworkError::MissingHost)?
            .to_string();
        Ok((url, host))
    }

    fn report(&self, host: &str) {
        debug!(host, "request short-circuited");
        self.notifier.notify(format!("blocked request: {host}"));
    }

    /// Async request. A blocked host resolves with a synthetic empty
    /// success on the next scheduler turn, preserving the caller's
    /// expectation of asynchrony.
    pub async fn fetch(&mut self, url: &str) -> Result<Response, NetworkError> {
        let (url, host) = Self::parse(url)?;
        if self.is_blocked(&host) {
            self.report(&host);
            tokio::task::yield_now().await;
            return Ok(Response::empty_success());
        }
        trace!(host = %host, "fetch passed through");
        self.backend.fetch(&url).await
    }

    /// Open a stateful request; the block decision is recorded here
    pub fn open(&self, method: &str, url: &str) -> Result<OutboundRequest, NetworkError> {
        let (url, host) = Self::parse(url)?;
        let blocked = self.is_blocked(&host);
        Ok(OutboundRequest {
            method: method.to_string(),
            url,
            blocked,
        })
    }

    /// Send an opened request. Transmission is skipped if the request was
    /// marked at open time; sending consumes the request, so each
    /// short-circuit notifies exactly once.
    pub fn send(
        &mut self,
        request: OutboundRequest,
        body: Option<&str>,
    ) -> Result<Response, NetworkError> {
        if request.blocked {
            if let Some(host) = request.url.host_str() {
                self.report(host);
            }
            return Ok(Response::empty_success());
        }
        self.backend.transmit(&request.url, body)
    }

    /// One-shot delivery. A blocked host reports success without
    /// transmitting anything.
    pub fn send_beacon(&mut self, url: &str, payload: &[u8]) -> bool {
        let (url, host) = match Self::parse(url) {
            Ok(parsed) => parsed,
            Err(_) => return false,
        };
        if self.is_blocked(&host) {
            self.report(&host);
            return true;
        }
        self.backend.send_beacon(&url, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::notification_channel;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct MockBackend {
        transmitted: Rc<RefCell<Vec<String>>>,
    }

    #[async_trait(?Send)]
    impl NetworkBackend for MockBackend {
        async fn fetch(&mut self, url: &Url) -> Result<Response, NetworkError> {
            self.transmitted.borrow_mut().push(url.to_string());
            Ok(Response {
                status: 200,
                body: "real".to_string(),
            })
        }

        fn transmit(&mut self, url: &Url, _body: Option<&str>) -> Result<Response, NetworkError> {
            self.transmitted.borrow_mut().push(url.to_string());
            Ok(Response {
                status: 204,
                body: String::new(),
            })
        }

        fn send_beacon(&mut self, url: &Url, _payload: &[u8]) -> bool {
            self.transmitted.borrow_mut().push(url.to_string());
            true
        }
    }

    fn interceptor() -> (
        NetworkInterceptor<MockBackend>,
        Rc<RefCell<Vec<String>>>,
        tokio::sync::mpsc::UnboundedReceiver<String>,
    ) {
        let backend = MockBackend::default();
        let transmitted = backend.transmitted.clone();
        let (notifier, rx) = notification_channel();
        let interceptor = NetworkInterceptor::new(backend, &NetworkConfig::default(), notifier);
        (interceptor, transmitted, rx)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_blocked_fetch_resolves_synthetic_success() {
        let (mut net, transmitted, mut rx) = interceptor();

        let response = net
            .fetch("https://stats.sophia.org/collect?uid=42")
            .await
            .unwrap();
        assert_eq!(response, Response::empty_success());
        assert!(transmitted.borrow().is_empty());
        // only the host leaks into the notification
        assert_eq!(
            rx.try_recv().unwrap(),
            "blocked request: stats.sophia.org"
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_allowed_fetch_passes_through() {
        let (mut net, transmitted, mut rx) = interceptor();

        let response = net.fetch("https://app.sophia.org/quiz").await.unwrap();
        assert_eq!(response.body, "real");
        assert_eq!(transmitted.borrow().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_suffix_matching() {
        let (net, _, _) = interceptor();
        assert!(net.is_blocked("dpm.demdex.net"));
        assert!(net.is_blocked("edge.dpm.demdex.net"));
        assert!(!net.is_blocked("notdpm-demdex.net"));
        assert!(!net.is_blocked("app.sophia.org"));
    }

    #[test]
    fn test_open_send_blocked_at_open_time() {
        let (mut net, transmitted, mut rx) = interceptor();

        let request = net
            .open("POST", "https://analytics.sophia.org/events")
            .unwrap();
        let response = net.send(request, Some("{\"e\":1}")).unwrap();
        assert_eq!(response, Response::empty_success());
        assert!(transmitted.borrow().is_empty());
        assert_eq!(
            rx.try_recv().unwrap(),
            "blocked request: analytics.sophia.org"
        );

        let request = net.open("GET", "https://app.sophia.org/next").unwrap();
        let response = net.send(request, None).unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(transmitted.borrow().len(), 1);
    }

    #[test]
    fn test_beacon_reports_success_without_transmitting() {
        let (mut net, transmitted, _) = interceptor();

        assert!(net.send_beacon("https://stat.sophia.org/b", b"payload"));
        assert!(transmitted.borrow().is_empty());

        assert!(net.send_beacon("https://app.sophia.org/b", b"payload"));
        assert_eq!(transmitted.borrow().len(), 1);
    }

    #[test]
    fn test_invalid_url_is_an_error() {
        let (net, _, _) = interceptor();
        assert!(net.open("GET", "not a url").is_err());
    }
}
