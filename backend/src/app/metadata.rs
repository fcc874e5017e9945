use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::{borrow::Cow, sync::Arc, time::Duration};
use tracing::trace;

pub const IPFS_SCHEME: &str = "ipfs://";

#[derive(Debug, Clone, Deserialize, serde_derive_default::Default)]
pub struct MetadataConfig {
    /// HTTP gateway prefix `ipfs://` locations are rewritten onto.
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,
    #[serde(with = "humantime_serde", default = "default_fetch_timeout")]
    pub timeout: Duration,
    /// Larger documents are rejected.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_ipfs_gateway() -> String {
    "https://ipfs.io/ipfs/".into()
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

/// Off-chain token metadata. Every field is optional, absence is never an error.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct TokenMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub attributes: Option<Vec<RawAttribute>>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawAttribute {
    #[serde(default)]
    pub trait_type: Option<String>,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("unsupported metadata location: {0}")]
    UnsupportedLocation(String),
    #[error("metadata request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("metadata host responded with status {0}")]
    Status(StatusCode),
    #[error("metadata exceeds {0} bytes")]
    TooLarge(usize),
    #[error("metadata is not valid json: {0}")]
    Parse(#[from] serde_json::Error),
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<TokenMetadata, MetadataError>;
}

/// Rewrites `ipfs://` locations onto an HTTP gateway, everything else passes through.
#[derive(Debug, Clone)]
pub struct IpfsGateway {
    prefix: String,
}

impl IpfsGateway {
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self { prefix }
    }

    pub fn resolve<'a>(&self, location: &'a str) -> Cow<'a, str> {
        match location.strip_prefix(IPFS_SCHEME) {
            Some(path) => Cow::Owned(format!("{}{}", self.prefix, path)),
            None => Cow::Borrowed(location),
        }
    }
}

#[derive(Clone)]
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
    gateway: Arc<IpfsGateway>,
    max_body_size: usize,
}

impl HttpMetadataFetcher {
    pub fn new(config: &MetadataConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(config.timeout).build()?,
            gateway: Arc::new(IpfsGateway::new(config.ipfs_gateway.clone())),
            max_body_size: config.max_body_size,
        })
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataFetcher {
    async fn fetch(&self, uri: &str) -> Result<TokenMetadata, MetadataError> {
        let location = self.gateway.resolve(uri);
        if !(location.starts_with("http://") || location.starts_with("https://")) {
            return Err(MetadataError::UnsupportedLocation(uri.to_string()));
        }

        let mut response = self.client.get(location.as_ref()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status(status));
        }
        if response
            .content_length()
            .is_some_and(|len| len > self.max_body_size as u64)
        {
            return Err(MetadataError::TooLarge(self.max_body_size));
        }
        // The header may be missing or wrong, the read itself is bounded too.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body_size {
                return Err(MetadataError::TooLarge(self.max_body_size));
            }
            body.extend_from_slice(&chunk);
        }
        trace!("raw metadata from {location}: {:?}", String::from_utf8_lossy(&body));
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as HttpStatus, routing::get, Router};

    #[test]
    fn test_gateway_rewrite() {
        let gateway = IpfsGateway::new("https://gateway.example/ipfs");
        assert_eq!(
            gateway.resolve("ipfs://xyz"),
            "https://gateway.example/ipfs/xyz"
        );
        assert_eq!(
            gateway.resolve("https://cdn.example/a.png"),
            "https://cdn.example/a.png"
        );
    }

    #[test]
    fn test_metadata_fields_are_optional() -> anyhow::Result<()> {
        let metadata: TokenMetadata = serde_json::from_str("{}")?;
        assert_eq!(metadata, TokenMetadata::default());

        let metadata: TokenMetadata = serde_json::from_str(
            r#"{"name":"Watch A","attributes":[{"trait_type":"Year","value":1998},{"value":"x"}]}"#,
        )?;
        let attributes = metadata.attributes.unwrap();
        assert_eq!(attributes[0].value, serde_json::json!(1998));
        assert_eq!(attributes[1].trait_type, None);
        Ok(())
    }

    async fn metadata_host() -> String {
        let app = Router::new()
            .route(
                "/ok.json",
                get(|| async { r#"{"name":"Watch A","image":"ipfs://xyz"}"# }),
            )
            .route("/broken.json", get(|| async { "{not json" }))
            .route(
                "/huge.json",
                get(|| async { format!(r#"{{"name":"{}"}}"#, "x".repeat(4096)) }),
            )
            .route(
                "/missing.json",
                get(|| async { (HttpStatus::NOT_FOUND, "nope") }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://127.0.0.1:{port}")
    }

    fn fetcher(gateway: &str) -> HttpMetadataFetcher {
        HttpMetadataFetcher::new(&MetadataConfig {
            ipfs_gateway: gateway.into(),
            timeout: Duration::from_secs(5),
            max_body_size: 1024,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_outcomes() -> anyhow::Result<()> {
        let host = metadata_host().await;
        let fetcher = fetcher(&host);

        let metadata = fetcher.fetch(&format!("{host}/ok.json")).await?;
        assert_eq!(metadata.name.as_deref(), Some("Watch A"));

        // ipfs:// locations go through the gateway
        let metadata = fetcher.fetch("ipfs://ok.json").await?;
        assert_eq!(metadata.image.as_deref(), Some("ipfs://xyz"));

        let err = fetcher
            .fetch(&format!("{host}/missing.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Status(status) if status == StatusCode::NOT_FOUND));

        let err = fetcher
            .fetch(&format!("{host}/broken.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Parse(_)), "{err:?}");

        let err = fetcher
            .fetch(&format!("{host}/huge.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::TooLarge(1024)), "{err:?}");

        let err = fetcher.fetch("ar://tx/7.json").await.unwrap_err();
        assert!(matches!(err, MetadataError::UnsupportedLocation(_)));
        Ok(())
    }
}
