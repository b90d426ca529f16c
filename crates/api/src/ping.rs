use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Outcome of a successful ping: HTTP status plus the response body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReceipt {
    pub status_code: u16,
    pub body: String,
}

/// Error type for channel ping operations.
#[derive(Debug, thiserror::Error)]
pub enum PingError {
    #[error("request failed with status code {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("response body is not valid text")]
    NonTextBody,
}

impl PingError {
    /// Numeric HTTP status when one is available. Transport errors and
    /// undecodable bodies have none.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Transport(_) | Self::NonTextBody => None,
        }
    }
}

/// Trait for channel endpoints that accept availability pings.
pub trait ChannelClient: Send + Sync {
    fn name(&self) -> &str;

    /// Issue one ping for the given channel key.
    /// No retries; a ping that has been sent runs to completion.
    fn channel_ping(
        &self,
        channel_key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<PingReceipt, PingError>> + Send + '_>>;
}

/// Canned result a [`MockClient`] returns on every call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Success with the given 2xx status code and an "ok" body.
    Ok(u16),
    /// Non-2xx HTTP response.
    Status(u16),
    /// Transport-level failure (no status code).
    Transport(String),
}

/// Mock client for testing — returns a fixed outcome and records calls.
#[derive(Debug, Clone)]
pub struct MockClient {
    outcome: MockOutcome,
    calls: Arc<AtomicUsize>,
    keys: Arc<Mutex<Vec<String>>>,
}

impl MockClient {
    pub fn ok(status_code: u16) -> Self {
        Self::with_outcome(MockOutcome::Ok(status_code))
    }

    pub fn failing_with_status(status_code: u16) -> Self {
        Self::with_outcome(MockOutcome::Status(status_code))
    }

    pub fn failing_with_transport(message: impl Into<String>) -> Self {
        Self::with_outcome(MockOutcome::Transport(message.into()))
    }

    pub fn with_outcome(outcome: MockOutcome) -> Self {
        Self {
            outcome,
            calls: Arc::new(AtomicUsize::new(0)),
            keys: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of pings issued through this mock so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Channel keys of every ping issued so far, in issue order.
    pub fn pinged_keys(&self) -> Vec<String> {
        self.keys.lock().expect("mock keys lock poisoned").clone()
    }
}

impl ChannelClient for MockClient {
    fn name(&self) -> &str {
        "mock"
    }

    fn channel_ping(
        &self,
        channel_key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<PingReceipt, PingError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys
            .lock()
            .expect("mock keys lock poisoned")
            .push(channel_key.to_owned());
        let outcome = self.outcome.clone();
        Box::pin(async move {
            match outcome {
                MockOutcome::Ok(code) => Ok(PingReceipt {
                    status_code: code,
                    body: "ok".into(),
                }),
                MockOutcome::Status(code) => Err(PingError::Status(code)),
                MockOutcome::Transport(msg) => Err(PingError::Transport(msg)),
            }
        })
    }
}
