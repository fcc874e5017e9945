use anyhow::Context as _;
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use services_common::utils::decode_success_type_or_raw;
use std::time::Duration;
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    /// Root of the user service, e.g. `https://users.example/api`.
    pub base_url: String,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub address: String,
    pub email: Option<String>,
    pub event_history: Vec<EventEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventEntry {
    pub token_id: String,
    pub event_name: String,
    pub date: String,
}

/// Result of a QR check, the user service is the only authority on it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct QrValidation {
    pub valid: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawProfile {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    event_history: RawHistory,
}

#[derive(Debug, Default, Deserialize)]
struct RawHistory(Option<Vec<RawEventEntry>>);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEventEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    token_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    event_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmailResponse {
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsResponse {
    #[serde(default)]
    event_history: RawHistory,
}

/// Token ids and dates come back as numbers from some deployments.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(value) => Some(value),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    })
}

impl RawHistory {
    /// Entries missing any field are not shown.
    fn complete(self) -> Vec<EventEntry> {
        self.0
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                let non_empty = |value: Option<String>| value.filter(|value| !value.is_empty());
                Some(EventEntry {
                    token_id: non_empty(entry.token_id)?,
                    event_name: non_empty(entry.event_name)?,
                    date: non_empty(entry.date)?,
                })
            })
            .collect()
    }
}

/// Client of the remote user service keeping emails, event history and QR checks.
#[derive(Debug, Clone)]
pub struct ProfileClient {
    client: reqwest::Client,
    base_url: String,
}

impl ProfileClient {
    pub fn new(config: &ProfileConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("build user service client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Unknown users have an empty profile.
    #[instrument(skip(self), level = "debug")]
    pub async fn get_user(&self, address: &str) -> anyhow::Result<UserProfile> {
        let response = self
            .client
            .get(self.url(&format!("/users/{address}")))
            .send()
            .await
            .context("request user profile")?;
        let raw = if response.status() == StatusCode::NOT_FOUND {
            debug!("no profile stored for {address}");
            RawProfile::default()
        } else {
            decode_success_type_or_raw::<RawProfile>(response).await?
        };

        Ok(UserProfile {
            address: address.to_string(),
            email: raw.email.filter(|email| !email.is_empty()),
            event_history: raw.event_history.complete(),
        })
    }

    /// Returns the email as stored by the service.
    #[instrument(skip(self), level = "debug")]
    pub async fn save_email(&self, address: &str, email: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .post(self.url(&format!("/users/{address}/email")))
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .context("submit email")?;
        let confirmed = decode_success_type_or_raw::<EmailResponse>(response).await?;
        Ok(confirmed.email)
    }

    /// Returns the full event history after registration.
    #[instrument(skip(self), level = "debug")]
    pub async fn register_event(
        &self,
        address: &str,
        entry: &EventEntry,
    ) -> anyhow::Result<Vec<EventEntry>> {
        let response = self
            .client
            .post(self.url(&format!("/users/{address}/events")))
            .json(entry)
            .send()
            .await
            .context("submit event registration")?;
        let history = decode_success_type_or_raw::<EventsResponse>(response).await?;
        Ok(history.event_history.complete())
    }

    /// Text is forwarded as is.
    pub async fn validate_qr(&self, qr_data: &str) -> anyhow::Result<QrValidation> {
        let response = self
            .client
            .post(self.url("/users/validate-qr"))
            .json(&serde_json::json!({ "qrData": qr_data }))
            .send()
            .await
            .context("submit qr code")?;
        decode_success_type_or_raw(response).await
    }
}
