use crate::app::{gallery::GalleryConfig, profile::ProfileConfig, SessionConfig};
use serde::Deserialize;
use services_common::{api::server::ApiConfig, evm::pool::EvmPoolConfig};

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    pub evm_pool: EvmPoolConfig,
    pub gallery: GalleryConfig,
    pub profile: ProfileConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use services_common::cfg::load_config_from;
    use std::time::Duration;

    #[test]
    fn test_load_dev_config() -> anyhow::Result<()> {
        let base_path = concat!(env!("CARGO_MANIFEST_DIR"), "/../config/dev");
        let cfg: Config = load_config_from(base_path, "api_server")?;

        assert_eq!(cfg.gallery.chain_id, 80002);
        assert_eq!(cfg.gallery.max_concurrent_tokens, 16);
        assert_eq!(cfg.gallery.placeholder_image, "https://via.placeholder.com/150");
        assert_eq!(cfg.gallery.metadata.timeout, Duration::from_secs(10));
        assert!(!cfg.evm_pool.rpc_clients.is_empty());
        assert!(cfg.api.expose_dev);
        assert_eq!(cfg.sessions.idle_timeout, Duration::from_secs(30 * 60));
        assert_eq!(cfg.sessions.max_sessions, 1000);
        Ok(())
    }
}
