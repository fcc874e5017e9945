use super::gallery::{
    card::{CardDetails, Experience},
    record::NftRecord,
    session::{GalleryStatus, GalleryView},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    /// Reuses the session when set, a new one is opened otherwise.
    pub session_id: Option<Uuid>,
    pub address: String,
    pub chain_id: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub session_id: Uuid,
    pub gallery: GalleryResponse,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SessionQuery {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResponse {
    pub session_id: Uuid,
    pub disconnected: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryItem {
    #[serde(flatten)]
    pub nft: NftRecord,
    pub card: CardDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryResponse {
    pub address: Option<String>,
    pub status: GalleryStatus,
    pub error: Option<String>,
    pub nfts: Vec<GalleryItem>,
}

impl From<GalleryView> for GalleryResponse {
    fn from(view: GalleryView) -> Self {
        let nfts = view
            .nfts
            .into_iter()
            .map(|nft| GalleryItem {
                card: CardDetails::of(&nft),
                nft,
            })
            .collect();
        Self {
            address: view.address,
            status: view.status,
            error: view.error,
            nfts,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExperiencesResponse {
    pub experiences: Vec<Experience>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEventRequest {
    pub session_id: Uuid,
    pub token_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveEmailRequest {
    pub session_id: Uuid,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateQrRequest {
    /// Scanned or typed text, forwarded untouched.
    pub qr_data: String,
}
