use super::rpc::EvmRpcClient;
use crate::utils::limiter::{LimiterGuard, RateLimitConfig};
use anyhow::bail;
use derive_more::derive::Deref;
use serde::Deserialize;
use std::{
    sync::{atomic, Arc},
    time::Duration,
};

#[derive(Deserialize, Debug, Clone)]
pub struct EvmPoolConfig {
    pub rpc_clients: Vec<EvmClientConfig>,
}

/// Round-robin set of rate limited JSON-RPC clients.
#[derive(Clone)]
pub struct EvmPool {
    rpc_clients: Arc<Balancer<EvmRpcNode>>,
}

impl EvmPool {
    pub fn from_cfg(cfg: EvmPoolConfig) -> anyhow::Result<Self> {
        if cfg.rpc_clients.is_empty() {
            bail!("evm pool requires at least one rpc client");
        }
        let rpc_clients = cfg
            .rpc_clients
            .into_iter()
            .map(EvmRpcNode::new)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            rpc_clients: Arc::new(Balancer::new(rpc_clients)),
        })
    }

    pub fn rpc_client(&self) -> &EvmRpcNode {
        self.rpc_clients.next()
    }
}

#[derive(Deref)]
pub struct EvmRpcNode {
    rpc_client: LimiterGuard<EvmRpcClient>,
}

impl EvmRpcNode {
    pub fn new(config: EvmClientConfig) -> anyhow::Result<Self> {
        let rpc_client = EvmRpcClient::new(config.node.rpc_url(), config.timeout)?;
        let rpc_client = LimiterGuard::new(rpc_client, config.limit.limiter());
        Ok(Self { rpc_client })
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct EvmClientConfig {
    #[serde(default)]
    pub limit: RateLimitConfig,
    pub node: NodeType,
    #[serde(with = "humantime_serde", default = "default_rpc_timeout")]
    pub timeout: Duration,
}

fn default_rpc_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type")]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Alchemy { network: String, api_key: String },
    Any { rpc_url: String },
}

impl NodeType {
    pub fn rpc_url(&self) -> String {
        match self {
            NodeType::Alchemy { network, api_key } => {
                format!("https://{network}.g.alchemy.com/v2/{api_key}")
            }
            NodeType::Any { rpc_url } => rpc_url.clone(),
        }
    }
}

struct Balancer<T> {
    data: Vec<T>,
    current_pos: atomic::AtomicUsize,
}

impl<T> Balancer<T> {
    fn new(data: Vec<T>) -> Self {
        Self {
            data,
            current_pos: atomic::AtomicUsize::default(),
        }
    }

    fn next(&self) -> &T {
        let length = self.data.len();
        let pos = self
            .current_pos
            .fetch_update(atomic::Ordering::SeqCst, atomic::Ordering::SeqCst, |x| {
                Some((x + 1) % length)
            })
            .expect("invariant: always ok");
        &self.data[pos]
    }
}
