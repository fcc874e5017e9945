use crate::app::{
    exposed::{
        ConnectRequest, ConnectResponse, DisconnectResponse, ExperiencesResponse, GalleryItem,
        GalleryResponse, RegisterEventRequest, SaveEmailRequest, SessionQuery, SessionRequest,
        ValidateQrRequest,
    },
    gallery::{
        card::{CardDetails, CardField, CardKind, Experience},
        session::GalleryStatus,
        Attribute, NftRecord,
    },
    profile::{EventEntry, QrValidation, UserProfile},
    App,
};
use axum::{
    extract::{DefaultBodyLimit, Query, State},
    routing::{get, post},
    Router,
};
use services_common::api::response::{ApiError, AppJson, ErrorResponse};
use utoipa::OpenApi;
use validator::Validate as _;

#[derive(OpenApi)]
#[openapi(
    paths(
        connect,
        disconnect,
        refresh,
        gallery,
        experiences,
        register_for_event,
        profile,
        save_email,
        validate_qr
    ),
    components(schemas(
        ConnectRequest,
        ConnectResponse,
        SessionRequest,
        DisconnectResponse,
        GalleryResponse,
        GalleryItem,
        GalleryStatus,
        NftRecord,
        Attribute,
        CardDetails,
        CardField,
        CardKind,
        ExperiencesResponse,
        Experience,
        RegisterEventRequest,
        SaveEmailRequest,
        UserProfile,
        EventEntry,
        ValidateQrRequest,
        QrValidation,
        ErrorResponse
    ))
)]
pub struct ApiDoc;

pub type BackendState = services_common::api::server::AppState<App>;

pub fn router() -> Router<BackendState> {
    Router::new()
        .nest(
            "/session",
            Router::new()
                .route("/connect", post(connect))
                .route("/disconnect", post(disconnect))
                .route("/refresh", post(refresh))
                .route("/gallery", get(gallery))
                .route("/experiences", get(experiences))
                .route("/experiences/register", post(register_for_event))
                .route("/profile", get(profile))
                .route("/profile/email", post(save_email)),
        )
        .route("/qr/validate", post(validate_qr))
        .layer(DefaultBodyLimit::max(1024 * 16))
}

#[utoipa::path(
    post,
    tag = "session",
    path = "/api/session/connect",
    request_body = ConnectRequest,
    responses(
        (status = 200, description = "Wallet connected, collection is loading", body = ConnectResponse),
        ErrorResponse
    )
)]
pub async fn connect(
    State(state): State<BackendState>,
    AppJson(request): AppJson<ConnectRequest>,
) -> Result<AppJson<ConnectResponse>, ApiError> {
    Ok(AppJson(state.app().connect(request)?))
}

#[utoipa::path(
    post,
    tag = "session",
    path = "/api/session/disconnect",
    request_body = SessionRequest,
    responses(
        (status = 200, description = "Session closed", body = DisconnectResponse),
        ErrorResponse
    )
)]
pub async fn disconnect(
    State(state): State<BackendState>,
    AppJson(request): AppJson<SessionRequest>,
) -> Result<AppJson<DisconnectResponse>, ApiError> {
    Ok(AppJson(state.app().disconnect(request.session_id)?))
}

#[utoipa::path(
    post,
    tag = "session",
    path = "/api/session/refresh",
    request_body = SessionRequest,
    responses(
        (status = 200, description = "Collection reload started", body = GalleryResponse),
        ErrorResponse
    )
)]
pub async fn refresh(
    State(state): State<BackendState>,
    AppJson(request): AppJson<SessionRequest>,
) -> Result<AppJson<GalleryResponse>, ApiError> {
    Ok(AppJson(state.app().refresh(request.session_id)?))
}

#[utoipa::path(
    get,
    tag = "session",
    path = "/api/session/gallery",
    params(SessionQuery),
    responses(
        (status = 200, description = "Current collection of the wallet", body = GalleryResponse),
        ErrorResponse
    )
)]
pub async fn gallery(
    State(state): State<BackendState>,
    Query(query): Query<SessionQuery>,
) -> Result<AppJson<GalleryResponse>, ApiError> {
    Ok(AppJson(state.app().gallery(query.session_id)?))
}

#[utoipa::path(
    get,
    tag = "session",
    path = "/api/session/experiences",
    params(SessionQuery),
    responses(
        (status = 200, description = "Event access granted by held tokens", body = ExperiencesResponse),
        ErrorResponse
    )
)]
pub async fn experiences(
    State(state): State<BackendState>,
    Query(query): Query<SessionQuery>,
) -> Result<AppJson<ExperiencesResponse>, ApiError> {
    Ok(AppJson(state.app().experiences(query.session_id)?))
}

#[utoipa::path(
    post,
    tag = "session",
    path = "/api/session/experiences/register",
    request_body = RegisterEventRequest,
    responses(
        (status = 200, description = "Registered, returns the updated profile", body = UserProfile),
        ErrorResponse
    )
)]
pub async fn register_for_event(
    State(state): State<BackendState>,
    AppJson(request): AppJson<RegisterEventRequest>,
) -> Result<AppJson<UserProfile>, ApiError> {
    Ok(AppJson(
        state
            .app()
            .register_for_event(request.session_id, &request.token_id)
            .await?,
    ))
}

#[utoipa::path(
    get,
    tag = "session",
    path = "/api/session/profile",
    params(SessionQuery),
    responses(
        (status = 200, description = "Profile of the connected wallet", body = UserProfile),
        ErrorResponse
    )
)]
pub async fn profile(
    State(state): State<BackendState>,
    Query(query): Query<SessionQuery>,
) -> Result<AppJson<UserProfile>, ApiError> {
    Ok(AppJson(state.app().profile(query.session_id).await?))
}

#[utoipa::path(
    post,
    tag = "session",
    path = "/api/session/profile/email",
    request_body = SaveEmailRequest,
    responses(
        (status = 200, description = "Email saved, returns the updated profile", body = UserProfile),
        ErrorResponse
    )
)]
pub async fn save_email(
    State(state): State<BackendState>,
    AppJson(request): AppJson<SaveEmailRequest>,
) -> Result<AppJson<UserProfile>, ApiError> {
    request
        .validate()
        .map_err(|err| ApiError::InvalidRequest(err.into()))?;
    Ok(AppJson(
        state
            .app()
            .save_email(request.session_id, &request.email)
            .await?,
    ))
}

#[utoipa::path(
    post,
    tag = "qr",
    path = "/api/qr/validate",
    request_body = ValidateQrRequest,
    responses(
        (status = 200, description = "Verdict of the user service", body = QrValidation),
        ErrorResponse
    )
)]
pub async fn validate_qr(
    State(state): State<BackendState>,
    AppJson(request): AppJson<ValidateQrRequest>,
) -> Result<AppJson<QrValidation>, ApiError> {
    Ok(AppJson(state.app().validate_qr(&request.qr_data).await?))
}
