use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::aggregator::Aggregator;
use crate::db::{Database, News};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

pub struct AppState {
    pub db: Arc<Database>,
    pub aggregator: Arc<Aggregator>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/news", get(news))
        .route("/news/:id/click", get(click))
        .route("/refresh", post(refresh))
        .route("/refresh/status", get(refresh_status))
        .route("/health", get(health))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

// Custom error type
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Serialize)]
pub struct RefreshStatus {
    pub refreshing: bool,
}

pub async fn news(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<News>>, AppError> {
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.max(0);

    let news = state.db.list_news(limit, offset).await?;
    Ok(Json(news))
}

/// Count the click, then send the reader on to the article.
pub async fn click(
    State(state): State<Arc<AppState>>,
    Path(news_id): Path<i64>,
) -> Result<Response, AppError> {
    match state.db.track_click(news_id).await? {
        Some(news) => {
            info!(news_id, clicks = news.clicks, "Tracked click");
            let location = HeaderValue::try_from(news.link.as_str())?;
            Ok((StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response())
        }
        None => Ok((StatusCode::NOT_FOUND, "News item not found").into_response()),
    }
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> Json<RefreshStatus> {
    let aggregator = state.aggregator.clone();
    tokio::spawn(async move {
        if let Err(e) = aggregator.refresh_all().await {
            error!("Manual aggregation failed: {}", e);
        }
    });

    Json(RefreshStatus { refreshing: true })
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> Json<RefreshStatus> {
    let refreshing = state.aggregator.is_refreshing().await;
    Json(RefreshStatus { refreshing })
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
