//! Network reachability checks used to decide whether requests go cache-only.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

/// Answers "can we reach the network right now".
#[async_trait]
pub trait Connectivity: Send + Sync {
  async fn is_online(&self) -> bool;
}

/// Fixed answer, e.g. from `--offline`.
#[derive(Debug, Clone, Copy)]
pub struct FixedConnectivity(pub bool);

#[async_trait]
impl Connectivity for FixedConnectivity {
  async fn is_online(&self) -> bool {
    self.0
  }
}

/// Probes reachability by opening a TCP connection to the API host.
#[derive(Debug, Clone)]
pub struct TcpProbe {
  addr: String,
  timeout: Duration,
}

impl TcpProbe {
  pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
    Self {
      addr: addr.into(),
      timeout,
    }
  }
}

#[async_trait]
impl Connectivity for TcpProbe {
  async fn is_online(&self) -> bool {
    let online = matches!(
      tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr)).await,
      Ok(Ok(_))
    );
    debug!(addr = %self.addr, online, "connectivity probe");
    online
  }
}

/// Connectivity that can be flipped at runtime.
#[derive(Debug, Clone)]
pub struct ManualConnectivity {
  online: Arc<AtomicBool>,
}

impl ManualConnectivity {
  pub fn new(online: bool) -> Self {
    Self {
      online: Arc::new(AtomicBool::new(online)),
    }
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }
}

#[async_trait]
impl Connectivity for ManualConnectivity {
  async fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_fixed() {
    assert!(FixedConnectivity(true).is_online().await);
    assert!(!FixedConnectivity(false).is_online().await);
  }

  #[tokio::test]
  async fn test_manual_toggle_is_shared_between_clones() {
    let conn = ManualConnectivity::new(true);
    let other = conn.clone();
    other.set_online(false);
    assert!(!conn.is_online().await);
  }

  #[tokio::test]
  async fn test_tcp_probe_reachable_listener() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let probe = TcpProbe::new(addr.to_string(), Duration::from_secs(1));
    assert!(probe.is_online().await);
  }

  #[tokio::test]
  async fn test_tcp_probe_closed_port() {
    let addr = {
      let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
      listener.local_addr().unwrap()
    };

    let probe = TcpProbe::new(addr.to_string(), Duration::from_secs(1));
    assert!(!probe.is_online().await);
  }
}
