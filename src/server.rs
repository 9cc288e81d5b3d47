use crate::app::ports::{ContentPort, DirectoryPort, ProfilePort};
use crate::config::Config;
use crate::error::Result;
use crate::infra::{build_http_client, AccessToken, WorkspaceClient};
use crate::pipeline::progress::{self, ProgressEvent};
use crate::pipeline::{AggregationPipeline, PipelineSettings, ServiceLimiters};
use axum::{
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::get,
    Extension, Router,
};
use hyper::Server;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Undelivered events buffered per connection before the pipeline waits on the client
const EVENT_BUFFER: usize = 16;

/// The three service handles a run talks to, bound to one caller's credentials.
#[derive(Clone)]
pub struct ServiceHandles {
    pub directory: Arc<dyn DirectoryPort>,
    pub content: Arc<dyn ContentPort>,
    pub profile: Arc<dyn ProfilePort>,
}

/// Builds service handles for a request's credentials.
pub trait ServiceFactory: Send + Sync {
    fn connect(&self, token: AccessToken) -> ServiceHandles;
}

/// Production factory: REST adapters sharing one HTTP client.
pub struct WorkspaceServiceFactory {
    http: reqwest::Client,
    config: Arc<Config>,
}

impl WorkspaceServiceFactory {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        Ok(Self {
            http: build_http_client(&config.services)?,
            config,
        })
    }
}

impl ServiceFactory for WorkspaceServiceFactory {
    fn connect(&self, token: AccessToken) -> ServiceHandles {
        let client = Arc::new(WorkspaceClient::new(
            self.http.clone(),
            &self.config.services,
            &self.config.pipeline,
            token,
        ));
        ServiceHandles {
            directory: client.clone(),
            content: client.clone(),
            profile: client,
        }
    }
}

/// Process-wide state: limiters are shared by every connection.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub limiters: ServiceLimiters,
    pub services: Arc<dyn ServiceFactory>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let services = Arc::new(WorkspaceServiceFactory::new(config.clone())?);
        Self::with_services(config, services)
    }

    pub fn with_services(config: Arc<Config>, services: Arc<dyn ServiceFactory>) -> Result<Self> {
        Ok(Self {
            limiters: ServiceLimiters::from_config(&config.limits)?,
            services,
            config,
        })
    }
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "usage-streamer",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Prometheus exposition
async fn metrics() -> Response {
    match crate::observability::metrics::render() {
        Some(body) => body.into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Server-sent event stream of one aggregation run
async fn users_stream(Extension(state): Extension<AppState>, headers: HeaderMap) -> Response {
    let token = match bearer_token(&headers) {
        Some(token) => token,
        None => return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
    };

    let services = state.services.connect(token);
    let pipeline = AggregationPipeline::new(
        services.directory,
        services.content,
        services.profile,
        &state.limiters,
        PipelineSettings::from(&state.config.pipeline),
    );
    let (stream, rx) = progress::channel(EVENT_BUFFER);
    tokio::spawn(async move {
        let summary = pipeline.run(stream).await;
        info!(
            run_id = %summary.run_id,
            outcome = ?summary.outcome,
            processed = summary.processed_count,
            total = summary.total_count,
            "Stream finished"
        );
    });

    let events = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(to_sse_event(&event)));
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

fn to_sse_event(event: &ProgressEvent) -> Event {
    let data = event.data_json().unwrap_or_else(|e| {
        warn!(event = event.name(), error = %e, "Failed to encode event payload");
        "{}".to_string()
    });
    Event::default().event(event.name()).data(data)
}

fn bearer_token(headers: &HeaderMap) -> Option<AccessToken> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(AccessToken::new(token))
    } else {
        None
    }
}

/// Create the HTTP router with all routes
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/users-stream", get(users_stream))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the configured address
pub async fn start_server(state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port).parse()?;
    let app = create_server(state);

    info!(%addr, "HTTP server listening");
    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
