use super::{reconcile::Reconciler, record::NftRecord};
use crate::app::error::GalleryError;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;

const LOAD_FAILED_MESSAGE: &str = "Failed to load your NFTs. Please try again.";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GalleryStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// What the UI renders for one wallet session.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryView {
    pub address: Option<String>,
    pub status: GalleryStatus,
    pub nfts: Vec<NftRecord>,
    pub error: Option<String>,
}

struct ActiveRun {
    generation: u64,
    address: String,
    cancel: CancellationToken,
}

/// Owns the presentation state of one connected wallet.
///
/// Every run gets a fresh generation and cancellation token, a run commits only while
/// it is still the newest one for the current address.
pub struct WalletSession {
    reconciler: Reconciler,
    view: watch::Sender<GalleryView>,
    active: Mutex<Option<ActiveRun>>,
    generation: AtomicU64,
}

impl WalletSession {
    pub fn new(reconciler: Reconciler) -> Arc<Self> {
        let (view, _) = watch::channel(GalleryView::default());
        Arc::new(Self {
            reconciler,
            view,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        })
    }

    pub fn view(&self) -> GalleryView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GalleryView> {
        self.view.subscribe()
    }

    pub fn active_address(&self) -> Option<String> {
        self.active_runs().as_ref().map(|run| run.address.clone())
    }

    /// Committed collection, what the user currently sees.
    pub fn collection(&self) -> Vec<NftRecord> {
        self.view.borrow().nfts.clone()
    }

    #[instrument(skip(self))]
    pub fn connect(self: &Arc<Self>, address: &str, chain_id: u64) -> Result<(), GalleryError> {
        let expected = self.reconciler.config().chain_id;
        if chain_id != expected {
            let err = GalleryError::WrongChain {
                expected,
                actual: chain_id,
            };
            self.view.send_modify(|view| view.error = Some(err.to_string()));
            return Err(err);
        }

        // Hex without `0x` parses too, runs and profile calls key on the checksummed form.
        let address = address
            .trim()
            .parse::<Address>()
            .map_err(|_| GalleryError::InvalidAddress(address.trim().to_string()))?
            .to_checksum(None);

        self.start_run(address);
        Ok(())
    }

    pub fn refresh(self: &Arc<Self>) -> Result<(), GalleryError> {
        let address = self.active_address().ok_or(GalleryError::NoActiveWallet)?;
        self.start_run(address);
        Ok(())
    }

    pub fn disconnect(&self) {
        let mut active = self.active_runs();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(run) = active.take() {
            debug!("disconnecting {}", run.address);
            run.cancel.cancel();
        }
        self.view.send_replace(GalleryView::default());
    }

    fn start_run(self: &Arc<Self>, address: String) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        {
            let mut active = self.active_runs();
            if let Some(previous) = active.replace(ActiveRun {
                generation,
                address: address.clone(),
                cancel: cancel.clone(),
            }) {
                debug!("superseding run {}", previous.generation);
                previous.cancel.cancel();
            }
            self.view.send_modify(|view| {
                if view.address.as_deref() != Some(address.as_str()) {
                    view.nfts.clear();
                }
                view.address = Some(address.clone());
                view.status = GalleryStatus::Loading;
                view.error = None;
            });
        }

        let session = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("run {generation} for {address} cancelled");
                }
                result = session.reconciler.reconcile(&address) => {
                    session.commit(generation, &address, result);
                }
            }
        });
    }

    fn commit(&self, generation: u64, address: &str, result: anyhow::Result<Vec<NftRecord>>) {
        // Held across the send so a newer run can't slip in between check and write.
        let active = self.active_runs();
        let current = active
            .as_ref()
            .is_some_and(|run| run.generation == generation && run.address == address);
        if !current {
            debug!("discarding stale run {generation} for {address}");
            return;
        }

        match result {
            Ok(nfts) => self.view.send_modify(|view| {
                view.nfts = nfts;
                view.status = GalleryStatus::Ready;
                view.error = None;
            }),
            Err(err) => {
                warn!("loading collection of {address} failed: {err:#}");
                self.view.send_modify(|view| {
                    view.status = GalleryStatus::Failed;
                    view.error = Some(LOAD_FAILED_MESSAGE.into());
                });
            }
        }
    }

    fn active_runs(&self) -> std::sync::MutexGuard<'_, Option<ActiveRun>> {
        // A poisoned lock only means a panic elsewhere, the state itself stays consistent.
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for WalletSession {
    fn drop(&mut self) {
        if let Some(run) = self.active_runs().take() {
            run.cancel.cancel();
        }
    }
}
