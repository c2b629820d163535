//! HTTP read API over the directory.
//!
//! One data endpoint: `GET /data?page=&search=&sortField=&sortOrder=`
//! answering records plus pagination metadata. Unknown sort parameters fall
//! back to the identity default rather than erroring; a page below 1 is a
//! client error; an all-tier data failure is a 503.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use meritdrop_core::{SortField, SortOrder, UserRecord};
use meritdrop_directory::{DirectoryError, DirectoryService, PageQuery};

/// Shared state behind the router.
pub struct ApiState {
    pub directory: DirectoryService,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/data", get(data))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(addr: SocketAddr, state: Arc<ApiState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "read API listening");
    axum::serve(listener, router(state)).await
}

#[derive(Debug, Deserialize)]
struct DataParams {
    page: Option<u32>,
    search: Option<String>,
    #[serde(rename = "sortField")]
    sort_field: Option<String>,
    #[serde(rename = "sortOrder")]
    sort_order: Option<String>,
}

#[derive(Debug, Serialize)]
struct DataResponse {
    records: Vec<UserRecord>,
    pagination: Pagination,
}

#[derive(Debug, Serialize)]
struct Pagination {
    current_page: u32,
    total: u64,
    last_page: u64,
}

async fn data(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<DataParams>,
) -> Result<Json<DataResponse>, ApiError> {
    let page = params.page.unwrap_or(1);
    let sort_field = params
        .sort_field
        .as_deref()
        .and_then(SortField::parse)
        .unwrap_or_default();
    let sort_order = params
        .sort_order
        .as_deref()
        .and_then(SortOrder::parse)
        .unwrap_or_default();
    let search = params.search.filter(|s| !s.is_empty());

    let query = PageQuery {
        page,
        sort_field,
        sort_order,
        search,
    };
    let served = state.directory.page(&query).await?;

    Ok(Json(DataResponse {
        pagination: Pagination {
            current_page: page,
            total: served.total,
            last_page: served.last_page(state.directory.page_size()),
        },
        records: served.records,
    }))
}

async fn healthz() -> &'static str {
    "ok"
}

struct ApiError(DirectoryError);

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            DirectoryError::InvalidPage => StatusCode::BAD_REQUEST,
            DirectoryError::SourceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
