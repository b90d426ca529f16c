use std::time::Duration;

use tokio::net::TcpStream;

/// Network reachability probe: a TCP connect-and-drop against a well-known
/// address, projected to a single boolean. The platform's richer path state
/// is deliberately out of scope.
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    addr: String,
    timeout: Duration,
}

impl ReachabilityProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    /// Sample current reachability. Connect failures and timeouts both map
    /// to `false`.
    pub async fn is_connected(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(self.addr.as_str())).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn local_listener_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let probe = ReachabilityProbe::new(addr.to_string(), Duration::from_secs(1));
        assert!(probe.is_connected().await);
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        // Bind to grab a free port, then drop the listener before probing.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let probe = ReachabilityProbe::new(addr.to_string(), Duration::from_millis(500));
        assert!(!probe.is_connected().await);
    }

    #[tokio::test]
    async fn unresolvable_host_is_unreachable() {
        let probe = ReachabilityProbe::new("host.invalid:443", Duration::from_millis(500));
        assert!(!probe.is_connected().await);
    }
}
