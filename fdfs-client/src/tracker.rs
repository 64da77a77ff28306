use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use fdfs_common::BackendError;

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::protocol::{self, StorageNode, QUERY_STORE_BODY_LEN};

/// Discovery client for the tracker tier.
///
/// Trackers are tried in rotation, starting from a random one so that many
/// processes sharing a configuration spread their first query.
pub struct Tracker {
    servers: Vec<String>,
    connect_timeout: Duration,
    network_timeout: Duration,
    next: AtomicUsize,
}

impl Tracker {
    pub fn new(config: &ClientConfig) -> Self {
        let start = if config.tracker_servers.is_empty() {
            0
        } else {
            rand::thread_rng().gen_range(0..config.tracker_servers.len())
        };
        Self {
            servers: config.tracker_servers.clone(),
            connect_timeout: config.connect_timeout(),
            network_timeout: config.network_timeout(),
            next: AtomicUsize::new(start),
        }
    }

    /// Ask the trackers for a storage node to upload to. The node selection
    /// policy belongs to the tracker; we take the first answer we get.
    pub async fn query_store(&self, group: Option<&str>) -> Result<StorageNode, BackendError> {
        let n = self.servers.len();
        if n == 0 {
            return Err(BackendError::Unavailable(
                "no tracker servers configured".to_string(),
            ));
        }

        let start = self.next.fetch_add(1, Ordering::Relaxed);
        let mut last_err = None;
        for i in 0..n {
            let addr = &self.servers[(start + i) % n];
            match self.query_one(addr, group).await {
                Ok(node) => {
                    info!(
                        tracker = %addr,
                        group = %node.group,
                        storage = %node.addr(),
                        store_path = node.store_path_index,
                        "Storage node assigned"
                    );
                    return Ok(node);
                }
                Err(e) => {
                    warn!(tracker = %addr, error = %e, "Tracker query failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            BackendError::Unavailable("no tracker answered".to_string())
        }))
    }

    async fn query_one(&self, addr: &str, group: Option<&str>) -> Result<StorageNode, BackendError> {
        let (cmd, body) = protocol::query_store_request(group)?;
        let mut conn = Connection::connect(addr, self.connect_timeout, self.network_timeout).await?;
        let reply = conn.request(cmd, &[&body[..]], Some(QUERY_STORE_BODY_LEN)).await?;
        let node = protocol::parse_store_reply(&reply)?;
        conn.quit().await;
        Ok(node)
    }
}
