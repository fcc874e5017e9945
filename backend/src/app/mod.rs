use chrono::SecondsFormat;
use error::GalleryError;
use exposed::{
    ConnectRequest, ConnectResponse, DisconnectResponse, ExperiencesResponse, GalleryResponse,
};
use gallery::{card::Experience, reconcile::Reconciler, session::WalletSession};
use profile::{EventEntry, ProfileClient, QrValidation, UserProfile};
use scanner::{ManualInput, QrScanner};
use serde::Deserialize;
use services_common::TZ;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::ValidateEmail as _;

pub mod chain;
pub mod error;
pub mod exposed;
pub mod gallery;
pub mod metadata;
pub mod profile;
pub mod scanner;

#[derive(Debug, Clone, Deserialize, serde_derive_default::Default)]
pub struct SessionConfig {
    /// Sessions untouched for this long are closed.
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    pub idle_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,
    /// Opening a session beyond this closes the longest idle one.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_max_sessions() -> usize {
    10_000
}

struct Session {
    wallet: Arc<WalletSession>,
    /// Last profile confirmed by the user service for the connected address.
    profile: Mutex<Option<UserProfile>>,
    last_seen: std::sync::Mutex<Instant>,
}

impl Session {
    fn new(wallet: Arc<WalletSession>) -> Self {
        Self {
            wallet,
            profile: Mutex::new(None),
            last_seen: std::sync::Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let last_seen = *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last_seen)
    }
}

pub struct App {
    reconciler: Reconciler,
    profiles: ProfileClient,
    config: SessionConfig,
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl App {
    pub fn new(reconciler: Reconciler, profiles: ProfileClient, config: SessionConfig) -> Self {
        Self {
            reconciler,
            profiles,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn session(&self, session_id: Uuid) -> Result<Arc<Session>, GalleryError> {
        let session = self
            .sessions
            .read()
            .map_err(|_| anyhow::anyhow!("session registry is poisoned"))?
            .get(&session_id)
            .cloned()
            .ok_or(GalleryError::SessionNotFound(session_id))?;
        session.touch();
        Ok(session)
    }

    /// Periodically closes sessions left idle, e.g. by a browser that went away.
    pub fn serve_expiry(self: &Arc<Self>) {
        let app = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(app.config.sweep_interval).await;
                match app.expire_idle() {
                    Ok(0) => {}
                    Ok(closed) => info!("closed {closed} idle sessions"),
                    Err(err) => error!("session expiry failed: {err:#}"),
                }
            }
        });
    }

    /// Closes every session idle for longer than the configured timeout.
    pub fn expire_idle(&self) -> anyhow::Result<usize> {
        let now = Instant::now();
        let expired: Vec<_> = {
            let mut sessions = self
                .sessions
                .write()
                .map_err(|_| anyhow::anyhow!("session registry is poisoned"))?;
            let ids: Vec<_> = sessions
                .iter()
                .filter(|(_, session)| session.idle_for(now) > self.config.idle_timeout)
                .map(|(session_id, _)| *session_id)
                .collect();
            ids.into_iter()
                .filter_map(|session_id| {
                    sessions.remove(&session_id).map(|session| (session_id, session))
                })
                .collect()
        };
        for (session_id, session) in &expired {
            debug!("session {session_id} expired");
            session.wallet.disconnect();
        }
        Ok(expired.len())
    }

    fn wallet_address(session: &Session) -> Result<String, GalleryError> {
        session
            .wallet
            .active_address()
            .ok_or(GalleryError::NoActiveWallet)
    }

    pub fn connect(&self, request: ConnectRequest) -> Result<ConnectResponse, GalleryError> {
        let (session_id, session) = match request.session_id {
            Some(session_id) => (session_id, self.session(session_id)?),
            None => (
                Uuid::new_v4(),
                Arc::new(Session::new(WalletSession::new(self.reconciler.clone()))),
            ),
        };

        session.wallet.connect(&request.address, request.chain_id)?;
        if request.session_id.is_none() {
            let evicted = {
                let mut sessions = self
                    .sessions
                    .write()
                    .map_err(|_| anyhow::anyhow!("session registry is poisoned"))?;
                let idlest = if sessions.len() >= self.config.max_sessions.max(1) {
                    let now = Instant::now();
                    sessions
                        .iter()
                        .max_by_key(|(_, session)| session.idle_for(now))
                        .map(|(session_id, _)| *session_id)
                } else {
                    None
                };
                let evicted = idlest.and_then(|idlest| {
                    sessions.remove(&idlest).map(|session| (idlest, session))
                });
                sessions.insert(session_id, session.clone());
                evicted
            };
            if let Some((evicted_id, evicted)) = evicted {
                warn!("session limit reached, closing idle session {evicted_id}");
                evicted.wallet.disconnect();
            }
            info!("opened session {session_id}");
        }

        Ok(ConnectResponse {
            session_id,
            gallery: session.wallet.view().into(),
        })
    }

    pub fn disconnect(&self, session_id: Uuid) -> Result<DisconnectResponse, GalleryError> {
        let session = self
            .sessions
            .write()
            .map_err(|_| anyhow::anyhow!("session registry is poisoned"))?
            .remove(&session_id)
            .ok_or(GalleryError::SessionNotFound(session_id))?;
        session.wallet.disconnect();
        info!("closed session {session_id}");

        Ok(DisconnectResponse {
            session_id,
            disconnected: true,
        })
    }

    pub fn refresh(&self, session_id: Uuid) -> Result<GalleryResponse, GalleryError> {
        let session = self.session(session_id)?;
        session.wallet.refresh()?;
        Ok(session.wallet.view().into())
    }

    pub fn gallery(&self, session_id: Uuid) -> Result<GalleryResponse, GalleryError> {
        Ok(self.session(session_id)?.wallet.view().into())
    }

    pub fn experiences(&self, session_id: Uuid) -> Result<ExperiencesResponse, GalleryError> {
        let session = self.session(session_id)?;
        let experiences = session
            .wallet
            .collection()
            .iter()
            .map(Experience::of)
            .collect();
        Ok(ExperiencesResponse { experiences })
    }

    pub async fn profile(&self, session_id: Uuid) -> Result<UserProfile, GalleryError> {
        let session = self.session(session_id)?;
        let address = Self::wallet_address(&session)?;
        let profile = self
            .profiles
            .get_user(&address)
            .await
            .map_err(backend_error("load your profile"))?;
        *session.profile.lock().await = Some(profile.clone());
        Ok(profile)
    }

    /// The cached profile only takes the email the user service confirmed.
    pub async fn save_email(
        &self,
        session_id: Uuid,
        email: &str,
    ) -> Result<UserProfile, GalleryError> {
        let email = email.trim();
        if !email.validate_email() {
            return Err(GalleryError::InvalidEmail(email.to_string()));
        }
        let session = self.session(session_id)?;
        let address = Self::wallet_address(&session)?;

        let mut cached = session.profile.lock().await;
        let mut profile = self.current_profile(&cached, &address).await?;
        profile.email = Some(
            self.profiles
                .save_email(&address, email)
                .await
                .map_err(backend_error("save your email"))?,
        );
        *cached = Some(profile.clone());
        Ok(profile)
    }

    /// Registers the wallet for the event a held token grants access to.
    pub async fn register_for_event(
        &self,
        session_id: Uuid,
        token_id: &str,
    ) -> Result<UserProfile, GalleryError> {
        let session = self.session(session_id)?;
        let address = Self::wallet_address(&session)?;

        let collection = session.wallet.collection();
        let record = collection
            .iter()
            .find(|record| record.token_id == token_id)
            .ok_or_else(|| GalleryError::NotOwned(token_id.to_string()))?;
        let event_name = record
            .event_access()
            .ok_or_else(|| GalleryError::NoEventAccess(token_id.to_string()))?;

        let entry = EventEntry {
            token_id: record.token_id.clone(),
            event_name: event_name.to_string(),
            date: TZ::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let mut cached = session.profile.lock().await;
        let mut profile = self.current_profile(&cached, &address).await?;
        profile.event_history = self
            .profiles
            .register_event(&address, &entry)
            .await
            .map_err(backend_error("register for the event"))?;
        info!("{address} registered for {} with token {}", entry.event_name, entry.token_id);
        *cached = Some(profile.clone());
        Ok(profile)
    }

    pub async fn validate_qr(&self, qr_data: &str) -> Result<QrValidation, GalleryError> {
        self.profiles
            .validate_qr(qr_data)
            .await
            .map_err(backend_error("validate the code"))
    }

    /// Scans a code (or takes it typed in) and validates it, `None` when the user gave up.
    pub async fn scan_and_validate(
        &self,
        scanner: &QrScanner,
        cancel: &CancellationToken,
        manual: &dyn ManualInput,
    ) -> Result<Option<QrValidation>, GalleryError> {
        match scanner.read_code(cancel, manual).await {
            Some(code) => self.validate_qr(&code).await.map(Some),
            None => Ok(None),
        }
    }

    async fn current_profile(
        &self,
        cached: &Option<UserProfile>,
        address: &str,
    ) -> Result<UserProfile, GalleryError> {
        match cached {
            Some(profile) if profile.address == address => Ok(profile.clone()),
            _ => self
                .profiles
                .get_user(address)
                .await
                .map_err(backend_error("load your profile")),
        }
    }
}

fn backend_error(action: &'static str) -> impl FnOnce(anyhow::Error) -> GalleryError {
    move |err| {
        warn!("user service failed to {action}: {err:#}");
        GalleryError::Backend(format!("Could not {action}, please try again later."))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::app::{
        gallery::{
            reconcile::tests::{gallery_config, FakeChain, FakeMetadata, OWNER},
            session::GalleryStatus,
        },
        profile::tests::{profile_client, user_service, FakeUsers, SECRET_QR},
        scanner::tests::{qr_frame, FakeCamera, PrefixDecoder, TypedCode},
    };
    use serde_json::json;
    use services_common::utils::tests::logger_setup;
    use std::time::Duration;

    const MINTER: &str = "0x0000000000000000000000000000000000000000";

    pub fn fake_chain() -> (FakeChain, FakeMetadata) {
        let chain = FakeChain::default()
            .transfer(MINTER, OWNER, 7)
            .transfer(MINTER, OWNER, 8)
            .token(7, OWNER, "https://meta.example/7.json")
            .token(8, OWNER, "https://meta.example/8.json");
        let metadata = FakeMetadata::default()
            .document(
                "https://meta.example/7.json",
                json!({
                    "name": "Watch A",
                    "image": "ipfs://xyz",
                    "attributes": [
                        {"trait_type": "Article", "value": "Reloj"},
                        {"trait_type": "Model", "value": "Seamaster"},
                        {"trait_type": "Event Access", "value": "Gala"}
                    ]
                }),
            )
            .document("https://meta.example/8.json", json!({"name": "Shirt"}));
        (chain, metadata)
    }

    pub async fn test_app(users: FakeUsers) -> App {
        let (chain, metadata) = fake_chain();
        let reconciler = Reconciler::new(Arc::new(chain), Arc::new(metadata), gallery_config());
        App::new(
            reconciler,
            profile_client(&user_service(users).await),
            SessionConfig::default(),
        )
    }

    pub async fn loaded(app: &App, session_id: Uuid) -> GalleryResponse {
        for _ in 0..100 {
            let gallery = app.gallery(session_id).unwrap();
            if gallery.status != GalleryStatus::Loading {
                return gallery;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("gallery never settled");
    }

    fn connect_request() -> ConnectRequest {
        ConnectRequest {
            session_id: None,
            address: OWNER.into(),
            chain_id: 80002,
        }
    }

    async fn connected(app: &App) -> Uuid {
        let response = app.connect(connect_request()).unwrap();
        loaded(app, response.session_id).await;
        response.session_id
    }

    #[tokio::test]
    async fn test_session_lifecycle() -> anyhow::Result<()> {
        logger_setup();
        let app = test_app(FakeUsers::default()).await;
        let session_id = connected(&app).await;

        let gallery = app.gallery(session_id)?;
        assert_eq!(gallery.status, GalleryStatus::Ready);
        assert_eq!(gallery.nfts.len(), 2);
        assert_eq!(gallery.nfts[0].card.fields[0].value, "Seamaster");

        let experiences = app.experiences(session_id)?.experiences;
        assert_eq!(experiences.len(), 2);
        assert!(experiences[0].registrable);
        assert!(!experiences[1].registrable);

        app.refresh(session_id)?;
        assert_eq!(loaded(&app, session_id).await.nfts.len(), 2);

        app.disconnect(session_id)?;
        assert!(matches!(
            app.gallery(session_id),
            Err(GalleryError::SessionNotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() -> anyhow::Result<()> {
        let (chain, metadata) = fake_chain();
        let reconciler = Reconciler::new(Arc::new(chain), Arc::new(metadata), gallery_config());
        let app = App::new(
            reconciler,
            profile_client(&user_service(FakeUsers::default()).await),
            SessionConfig {
                idle_timeout: Duration::from_millis(300),
                ..Default::default()
            },
        );
        let idle = app.connect(connect_request())?.session_id;
        let active = app.connect(connect_request())?.session_id;
        assert_eq!(app.expire_idle()?, 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        app.gallery(active)?;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(app.expire_idle()?, 1);
        assert!(matches!(
            app.gallery(idle),
            Err(GalleryError::SessionNotFound(_))
        ));
        assert!(app.gallery(active).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_session_limit_closes_idlest() -> anyhow::Result<()> {
        let (chain, metadata) = fake_chain();
        let reconciler = Reconciler::new(Arc::new(chain), Arc::new(metadata), gallery_config());
        let app = App::new(
            reconciler,
            profile_client(&user_service(FakeUsers::default()).await),
            SessionConfig {
                max_sessions: 2,
                ..Default::default()
            },
        );
        let first = app.connect(connect_request())?.session_id;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = app.connect(connect_request())?.session_id;
        tokio::time::sleep(Duration::from_millis(20)).await;
        app.gallery(first)?;

        let third = app.connect(connect_request())?.session_id;
        assert_eq!(app.sessions.read().unwrap().len(), 2);
        assert!(matches!(
            app.gallery(second),
            Err(GalleryError::SessionNotFound(_))
        ));
        assert!(app.gallery(first).is_ok());
        assert!(app.gallery(third).is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_wrong_chain_opens_no_session() {
        let app = test_app(FakeUsers::default()).await;
        let err = app
            .connect(ConnectRequest {
                session_id: None,
                address: OWNER.into(),
                chain_id: 137,
            })
            .unwrap_err();
        assert!(matches!(err, GalleryError::WrongChain { .. }));
        assert!(app.sessions.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_for_event() -> anyhow::Result<()> {
        let users = FakeUsers::default();
        let app = test_app(users.clone()).await;
        let session_id = connected(&app).await;

        let profile = app.register_for_event(session_id, "7").await?;
        assert_eq!(profile.event_history.len(), 1);
        let entry = &profile.event_history[0];
        assert_eq!(entry.token_id, "7");
        assert_eq!(entry.event_name, "Gala");
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.date).is_ok());
        assert!(entry.date.ends_with('Z'));

        assert!(matches!(
            app.register_for_event(session_id, "8").await,
            Err(GalleryError::NoEventAccess(_))
        ));
        assert!(matches!(
            app.register_for_event(session_id, "99").await,
            Err(GalleryError::NotOwned(_))
        ));
        assert_eq!(app.profile(session_id).await?.event_history.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_email() -> anyhow::Result<()> {
        let app = test_app(FakeUsers::default()).await;
        let session_id = connected(&app).await;

        assert!(matches!(
            app.save_email(session_id, "not-an-email").await,
            Err(GalleryError::InvalidEmail(_))
        ));
        assert_eq!(app.profile(session_id).await?.email, None);

        let profile = app.save_email(session_id, " fan@club.io ").await?;
        assert_eq!(profile.email.as_deref(), Some("fan@club.io"));
        assert_eq!(
            app.profile(session_id).await?.email.as_deref(),
            Some("fan@club.io")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_profile() -> anyhow::Result<()> {
        let (chain, metadata) = fake_chain();
        let reconciler = Reconciler::new(Arc::new(chain), Arc::new(metadata), gallery_config());
        // nothing listens on port 9
        let app = App::new(
            reconciler,
            profile_client("http://127.0.0.1:9"),
            SessionConfig::default(),
        );
        let session_id = connected(&app).await;

        let err = app.profile(session_id).await.unwrap_err();
        assert!(matches!(err, GalleryError::Backend(_)));
        let session = app.session(session_id)?;
        assert!(session.profile.lock().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_scan_and_validate() -> anyhow::Result<()> {
        let app = test_app(FakeUsers::default()).await;
        let cancel = CancellationToken::new();

        let scanner = QrScanner::new(
            Arc::new(FakeCamera::with_frames(vec![Ok(Some(qr_frame(SECRET_QR)))])),
            Arc::new(PrefixDecoder),
        );
        let validation = app
            .scan_and_validate(&scanner, &cancel, &TypedCode(None))
            .await?;
        assert!(validation.unwrap().valid);

        let mut camera = FakeCamera::with_frames(vec![]);
        camera.acquire_error = Some(scanner::DeviceError::PermissionDenied);
        let scanner = QrScanner::new(Arc::new(camera), Arc::new(PrefixDecoder));
        let validation = app
            .scan_and_validate(&scanner, &cancel, &TypedCode(Some("forged".into())))
            .await?;
        assert!(!validation.unwrap().valid);

        let validation = app
            .scan_and_validate(&scanner, &cancel, &TypedCode(None))
            .await?;
        assert!(validation.is_none());
        Ok(())
    }
}
