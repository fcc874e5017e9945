use super::{
    record::{NftRecord, RecordRules},
    GalleryConfig,
};
use crate::app::{
    chain::{same_address, BlockRange, ChainReader, TransferLog},
    metadata::{IpfsGateway, MetadataSource},
};
use alloy_primitives::U256;
use anyhow::Context as _;
use futures::StreamExt as _;
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info, instrument, warn};

/// Rebuilds the set of tokens a wallet holds right now, rendered for display.
///
/// Transfer history only nominates candidates: a token is kept only if `ownerOf`
/// still points at the wallet when it is read.
#[derive(Clone)]
pub struct Reconciler {
    chain: Arc<dyn ChainReader>,
    metadata: Arc<dyn MetadataSource>,
    config: Arc<GalleryConfig>,
    rules: Arc<RecordRules>,
}

impl Reconciler {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        metadata: Arc<dyn MetadataSource>,
        config: GalleryConfig,
    ) -> Self {
        let rules = RecordRules {
            gateway: IpfsGateway::new(config.metadata.ipfs_gateway.clone()),
            placeholder_image: config.placeholder_image.clone(),
        };
        Self {
            chain,
            metadata,
            config: Arc::new(config),
            rules: Arc::new(rules),
        }
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Fails only when the transfer history can't be read, token-level problems
    /// just drop that token.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, owner: &str) -> anyhow::Result<Vec<NftRecord>> {
        let contract = self.config.contract_address;
        let logs = self
            .chain
            .transfer_logs(contract, BlockRange::full_history())
            .await
            .context("read transfer history")?;

        let candidates = candidate_token_ids(&logs, owner);
        debug!(
            "{} transfer logs, {} candidate tokens",
            logs.len(),
            candidates.len()
        );

        let records: Vec<NftRecord> = futures::stream::iter(candidates)
            .map(|token_id| {
                let this = self.clone();
                let owner = owner.to_string();
                async move { this.token_record(&owner, token_id).await }
            })
            .buffered(self.config.max_concurrent_tokens.max(1))
            .filter_map(futures::future::ready)
            .collect()
            .await;

        info!("reconciled {} owned tokens", records.len());
        Ok(records)
    }

    async fn token_record(&self, owner: &str, token_id: U256) -> Option<NftRecord> {
        match self.try_token_record(owner, token_id).await {
            Ok(record) => record,
            Err(err) => {
                warn!("dropping token {token_id}: {err:#}");
                None
            }
        }
    }

    async fn try_token_record(
        &self,
        owner: &str,
        token_id: U256,
    ) -> anyhow::Result<Option<NftRecord>> {
        let contract = self.config.contract_address;

        let current_owner = self.chain.owner_of(contract, token_id).await?;
        if !same_address(&current_owner, owner) {
            debug!("token {token_id} moved on to {current_owner}");
            return Ok(None);
        }

        let uri = self.chain.token_uri(contract, token_id).await?;
        let metadata = self
            .metadata
            .fetch(&uri)
            .await
            .with_context(|| format!("metadata at {uri}"))?;

        Ok(Some(NftRecord::from_metadata(
            token_id.to_string(),
            uri,
            metadata,
            &self.rules,
        )))
    }
}

/// Token ids received by `owner`, first-seen order, each id once.
pub fn candidate_token_ids(logs: &[TransferLog], owner: &str) -> Vec<U256> {
    let mut seen = HashSet::new();
    logs.iter()
        .filter(|log| same_address(&log.to, owner))
        .map(|log| log.token_id)
        .filter(|token_id| seen.insert(*token_id))
        .collect()
}
