use super::{BlockRange, ChainReader, TransferLog};
use crate::{define_selector, utils::ABI_WORD_SIZE};
use alloy_primitives::{b256, Address, Bytes, B256, U256};
use anyhow::{bail, Context as _};
use async_trait::async_trait;
use services_common::evm::{
    pool::EvmPool,
    rpc::{Log, LogFilter},
};
use tracing::{debug, instrument, trace};

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_EVENT_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

define_selector!(OwnerOf, "ownerOf(uint256)", [0x63, 0x52, 0x21, 0x1e]);
define_selector!(TokenUri, "tokenURI(uint256)", [0xc8, 0x7b, 0x56, 0xdd]);

/// [`ChainReader`] backed by JSON-RPC nodes from the pool.
#[derive(Clone)]
pub struct Erc721Reader {
    pool: EvmPool,
}

impl Erc721Reader {
    pub fn new(pool: EvmPool) -> Self {
        Self { pool }
    }

    async fn call_with_token(
        &self,
        contract: Address,
        selector: [u8; 4],
        token_id: U256,
    ) -> anyhow::Result<Bytes> {
        let data = encode_token_call(selector, token_id);
        let output = self
            .pool
            .rpc_client()
            .use_single()
            .await
            .call(contract, data)
            .await?;
        Ok(output)
    }
}

#[async_trait]
impl ChainReader for Erc721Reader {
    #[instrument(skip(self), level = "debug")]
    async fn transfer_logs(
        &self,
        contract: Address,
        range: BlockRange,
    ) -> anyhow::Result<Vec<TransferLog>> {
        let filter = LogFilter {
            address: contract,
            topics: vec![Some(TRANSFER_EVENT_TOPIC)],
            from_block: range.from,
            to_block: range.to,
        };
        let logs = self
            .pool
            .rpc_client()
            .use_single()
            .await
            .get_logs(&filter)
            .await
            .context("query transfer logs")?;
        debug!("received {} raw transfer logs", logs.len());

        Ok(logs.iter().filter_map(decode_transfer_log).collect())
    }

    async fn owner_of(&self, contract: Address, token_id: U256) -> anyhow::Result<String> {
        let output = self
            .call_with_token(contract, OWNER_OF_SELECTOR, token_id)
            .await
            .with_context(|| format!("ownerOf({token_id})"))?;
        Ok(decode_address(&output)?.to_checksum(None))
    }

    async fn token_uri(&self, contract: Address, token_id: U256) -> anyhow::Result<String> {
        let output = self
            .call_with_token(contract, TOKEN_URI_SELECTOR, token_id)
            .await
            .with_context(|| format!("tokenURI({token_id})"))?;
        decode_string(&output)
    }
}

/// ERC-721 transfers index all three params; ERC-20 transfers share topic0 but carry
/// the amount in data, so anything without exactly four topics is not ours.
fn decode_transfer_log(log: &Log) -> Option<TransferLog> {
    if log.removed {
        trace!("skipping removed log {:?}", log.transaction_hash);
        return None;
    }
    let [topic, from, to, token_id] = log.topics.as_slice() else {
        trace!(
            "skipping log with {} topics at {:?}",
            log.topics.len(),
            log.block_number
        );
        return None;
    };
    if *topic != TRANSFER_EVENT_TOPIC {
        return None;
    }
    Some(TransferLog {
        from: Address::from_word(*from).to_checksum(None),
        to: Address::from_word(*to).to_checksum(None),
        token_id: U256::from_be_bytes(token_id.0),
    })
}

fn encode_token_call(selector: [u8; 4], token_id: U256) -> Bytes {
    let mut data = Vec::with_capacity(selector.len() + ABI_WORD_SIZE);
    data.extend_from_slice(&selector);
    data.extend_from_slice(&token_id.to_be_bytes::<ABI_WORD_SIZE>());
    data.into()
}

fn word_at(data: &[u8], offset: usize) -> anyhow::Result<&[u8]> {
    let end = offset
        .checked_add(ABI_WORD_SIZE)
        .ok_or_else(|| anyhow::anyhow!("abi offset {offset} overflows"))?;
    data.get(offset..end).ok_or_else(|| {
        anyhow::anyhow!(
            "abi data too short: need {end} bytes, got {}",
            data.len()
        )
    })
}

fn usize_at(data: &[u8], offset: usize) -> anyhow::Result<usize> {
    let value = U256::from_be_slice(word_at(data, offset)?);
    if value.bit_len() > 32 {
        bail!("abi offset or length {value} out of range");
    }
    Ok(value.to::<u64>() as usize)
}

pub fn decode_address(data: &[u8]) -> anyhow::Result<Address> {
    Ok(Address::from_word(B256::from_slice(word_at(data, 0)?)))
}

pub fn decode_string(data: &[u8]) -> anyhow::Result<String> {
    let offset = usize_at(data, 0)?;
    let len = usize_at(data, offset)?;
    let start = offset + ABI_WORD_SIZE;
    let bytes = data.get(start..start + len).ok_or_else(|| {
        anyhow::anyhow!(
            "abi string of {len} bytes at {start} exceeds data of {} bytes",
            data.len()
        )
    })?;
    String::from_utf8(bytes.to_vec()).context("abi string is not utf-8")
}
