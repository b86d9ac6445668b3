//! Pooled outbound clients, one per upstream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::model::Upstream;

/// A configured client together with the timeout it was built for.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    pub client: reqwest::Client,
    pub timeout: Duration,
}

impl UpstreamClient {
    pub fn for_upstream(upstream: &Upstream) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(upstream.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(upstream.max_idle_conns)
            .pool_idle_timeout(Duration::from_secs(upstream.idle_conn_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, timeout })
    }
}

/// Client set owned by a single snapshot.
#[derive(Debug, Clone, Default)]
pub struct UpstreamClients {
    clients: HashMap<String, UpstreamClient>,
}

impl UpstreamClients {
    /// Build a client for every enabled upstream.
    pub fn build<'a, I>(upstreams: I) -> Result<Self, reqwest::Error>
    where
        I: IntoIterator<Item = &'a Arc<Upstream>>,
    {
        let mut clients = HashMap::new();
        for upstream in upstreams {
            if !upstream.enabled {
                continue;
            }
            clients.insert(upstream.id.clone(), UpstreamClient::for_upstream(upstream)?);
        }
        Ok(Self { clients })
    }

    pub fn get(&self, upstream_id: &str) -> Option<&UpstreamClient> {
        self.clients.get(upstream_id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
