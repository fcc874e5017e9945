use super::metadata::MetadataConfig;
use alloy_primitives::Address;
use serde::Deserialize;

pub mod card;
pub mod reconcile;
pub mod record;
pub mod session;

pub use record::{Attribute, Attributes, NftRecord};

#[derive(Debug, Clone, Deserialize)]
pub struct GalleryConfig {
    pub contract_address: Address,

    /// Chain the contract is deployed on, wallets on another chain are rejected.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    #[serde(default = "default_placeholder_image")]
    pub placeholder_image: String,

    #[serde(default = "default_max_concurrent_tokens")]
    pub max_concurrent_tokens: usize,

    #[serde(default)]
    pub metadata: MetadataConfig,
}

/// Polygon Amoy testnet.
fn default_chain_id() -> u64 {
    80002
}

fn default_placeholder_image() -> String {
    "https://via.placeholder.com/150".into()
}

fn default_max_concurrent_tokens() -> usize {
    16
}
