use anyhow::bail;
use reqwest::Response;
use serde::de::DeserializeOwned;

pub mod limiter;

/// Decodes type from json or return err with raw body info.
pub async fn decode_response_type_or_raw<T: DeserializeOwned>(
    response: Response,
) -> anyhow::Result<T> {
    let status = response.status();
    let bytes = response.bytes().await?;
    match serde_json::from_slice::<T>(&bytes) {
        Ok(response) => Ok(response),
        Err(err) => {
            bail!(
                "failed to decode to json response: {err:?}, raw body: {:?}, status: {status}",
                String::from_utf8_lossy(&bytes)
            )
        }
    }
}

/// Same as [`decode_response_type_or_raw`], but non-2xx statuses are errors regardless of body.
pub async fn decode_success_type_or_raw<T: DeserializeOwned>(
    response: Response,
) -> anyhow::Result<T> {
    let status = response.status();
    if !status.is_success() {
        let bytes = response.bytes().await.unwrap_or_default();
        bail!(
            "unexpected response status {status}, raw body: {:?}",
            String::from_utf8_lossy(&bytes)
        );
    }
    decode_response_type_or_raw(response).await
}
