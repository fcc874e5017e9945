use super::response::{ApiError, AppJson};
use anyhow::Context as _;
use axum::{
    extract::{MatchedPath, Request},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;
use utoipa_redoc::{Redoc, Servable};
use utoipa_swagger_ui::SwaggerUi;

#[derive(Deserialize, Debug, Clone, serde_derive_default::Default)]
pub struct ApiConfig {
    #[serde(default = "expose_docs_default")]
    pub expose_dev: bool,

    /// Browser UI is usually served from another origin.
    #[serde(default = "permissive_cors_default")]
    pub permissive_cors: bool,

    #[serde(default)]
    pub listen: ListenConfig,
}

#[derive(Deserialize, Debug, Clone, serde_derive_default::Default)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u64,
}

impl ListenConfig {
    pub fn as_bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn default_host() -> String {
    "localhost".into()
}

pub fn default_port() -> u64 {
    8000
}

pub fn expose_docs_default() -> bool {
    false
}

pub fn permissive_cors_default() -> bool {
    true
}

pub struct AppState<T> {
    app: Arc<T>,
    config: Arc<ApiConfig>,
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            app: self.app.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T> AppState<T> {
    pub fn new(app: Arc<T>, config: ApiConfig) -> Self {
        Self {
            app,
            config: Arc::new(config),
        }
    }

    pub fn app(&self) -> Arc<T> {
        self.app.clone()
    }
}

/// Assembles the full service router: `/api` routes, `/service` routes and optional docs.
pub fn build_router<T: Send + Sync + 'static, O: OpenApi>(
    state: AppState<T>,
    api_router: Router<AppState<T>>,
) -> Router {
    let service = Router::new().route("/health", get(health));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        .on_failure(());

    let app = Router::new();
    let app = if state.config.expose_dev {
        app.merge(SwaggerUi::new("/api/docs/swagger").url("/api/docs/openapi.json", O::openapi()))
            .merge(Redoc::with_url("/api/docs/redoc", O::openapi()))
            .merge(RapiDoc::new("/api/docs/openapi.json").path("/api/docs/rapidoc"))
    } else {
        app
    };
    let app = app
        .nest("/api", api_router)
        .nest("/service", service)
        .layer(trace_layer);
    let app = if state.config.permissive_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };
    app.with_state(state)
}

pub async fn serve<T: Send + Sync + 'static, O: OpenApi>(
    state: AppState<T>,
    api_router: Router<AppState<T>>,
) -> anyhow::Result<()> {
    let listen = state.config.listen.as_bind();
    let app = build_router::<T, O>(state, api_router);

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("bind api listener on {listen}"))?;
    tracing::info!("listening api on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Deserialize, Serialize, Debug, Clone)]
struct HealthResponse {
    status: bool,
}

async fn health() -> Result<AppJson<HealthResponse>, ApiError> {
    Ok(AppJson(HealthResponse { status: true }))
}
