use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use services_common::evm::rpc::BlockTag;

pub mod erc721;

/// Decoded ERC-721 `Transfer(from, to, tokenId)` log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLog {
    pub from: String,
    pub to: String,
    pub token_id: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: BlockTag,
    pub to: BlockTag,
}

impl BlockRange {
    /// Genesis to latest, every run rescans the whole history.
    pub fn full_history() -> Self {
        Self {
            from: BlockTag::Number(0),
            to: BlockTag::Latest,
        }
    }
}

/// Read access to an ERC-721 contract.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn transfer_logs(
        &self,
        contract: Address,
        range: BlockRange,
    ) -> anyhow::Result<Vec<TransferLog>>;

    async fn owner_of(&self, contract: Address, token_id: U256) -> anyhow::Result<String>;

    async fn token_uri(&self, contract: Address, token_id: U256) -> anyhow::Result<String>;
}

/// Chain addresses carry no canonical casing (checksummed, lower, upper all occur).
pub fn same_address(lhs: &str, rhs: &str) -> bool {
    lhs.trim().eq_ignore_ascii_case(rhs.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_address_ignores_case() {
        assert!(same_address(
            "0xABCDabcdABCDabcdABCDabcdABCDabcdABCDabcd",
            "0xabcdabcdabcdabcdabcdabcdabcdabcdabcdabcd"
        ));
        assert!(same_address(" 0xab ", "0xAB"));
        assert!(!same_address(
            "0xabcdabcdabcdabcdabcdabcdabcdabcdabcdabcd",
            "0xabcdabcdabcdabcdabcdabcdabcdabcdabcdabce"
        ));
    }
}
