use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use fdfs_common::BackendError;

use crate::config::ClientConfig;
use crate::connection::Connection;

#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub connect_timeout: Duration,
    pub network_timeout: Duration,
    /// Idle connections older than this are closed instead of reused.
    pub idle_timeout: Duration,
    pub max_idle: usize,
}

impl PoolSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            network_timeout: config.network_timeout(),
            idle_timeout: config.idle_timeout(),
            max_idle: config.max_idle_connections,
        }
    }
}

/// Connections to one storage node, checked out one per call.
///
/// There is no cap on connections in use; a checkout with no idle
/// connection opens a new one. Only the idle set is bounded.
pub struct ConnectionPool {
    addr: String,
    settings: PoolSettings,
    idle: Mutex<VecDeque<Connection>>,
}

impl ConnectionPool {
    pub fn new(addr: impl Into<String>, settings: PoolSettings) -> Self {
        Self {
            addr: addr.into(),
            settings,
            idle: Mutex::new(VecDeque::new()),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn checkout(&self) -> Result<Connection, BackendError> {
        loop {
            let conn = self.idle.lock().await.pop_front();
            match conn {
                Some(conn) if conn.idle_for() >= self.settings.idle_timeout => {
                    debug!(addr = %self.addr, "Dropping stale pooled connection");
                }
                Some(conn) => return Ok(conn),
                None => break,
            }
        }
        Connection::connect(
            &self.addr,
            self.settings.connect_timeout,
            self.settings.network_timeout,
        )
        .await
    }

    /// Return a healthy connection for reuse.
    pub async fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock().await;
        if idle.len() < self.settings.max_idle {
            idle.push_back(conn);
        }
    }

    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }
}
