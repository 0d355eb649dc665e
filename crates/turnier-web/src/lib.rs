//! Axum JSON read API over the tournament store.
//!
//! Thin consumer of the persistence gateway plus a manual crawl trigger; the
//! pipeline itself never depends on this crate.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use turnier_core::{Category, Month, Tournament, TournamentType};
use turnier_pipeline::{Orchestrator, RunReport, RunStatus};
use turnier_store::{Page, StoreError, TournamentFilter, TournamentStore};

pub const CRATE_NAME: &str = "turnier-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TournamentStore>,
    /// Present when the process also hosts the pipeline; `POST /api/crawl`
    /// is unavailable without it.
    pub orchestrator: Option<Arc<Orchestrator>>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/tournaments", get(tournaments_handler))
        .route("/api/months", get(months_handler))
        .route("/api/years", get(years_handler))
        .route("/api/categories", get(categories_handler))
        .route("/api/crawl", post(crawl_handler))
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "serving tournament API");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[derive(Debug, Deserialize, Default)]
struct TournamentsQuery {
    month: Option<String>,
    year: Option<i32>,
    is_international: Option<bool>,
    tournament_type: Option<String>,
    category: Option<String>,
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
struct PaginationMeta {
    total: u64,
    page: u32,
    page_size: u32,
    pages: u64,
}

#[derive(Debug, Serialize)]
struct TournamentsResponse {
    status: &'static str,
    data: Vec<Tournament>,
    meta: PaginationMeta,
}

#[derive(Debug, Serialize)]
struct ListResponse<T> {
    status: &'static str,
    data: Vec<T>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

fn store_error(err: StoreError) -> Response {
    tracing::error!(error = %err, "store query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            status: "error",
            message: err.to_string(),
        }),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            status: "error",
            message,
        }),
    )
        .into_response()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "message": "API is up and running"
    }))
}

fn build_filter(query: &TournamentsQuery) -> Result<TournamentFilter, Response> {
    let month = match &query.month {
        Some(raw) => Some(
            Month::parse(raw).ok_or_else(|| bad_request(format!("unknown month {raw:?}")))?,
        ),
        None => None,
    };
    let tournament_type = match &query.tournament_type {
        Some(raw) => Some(
            TournamentType::parse(raw)
                .ok_or_else(|| bad_request(format!("unknown tournament type {raw:?}")))?,
        ),
        None => None,
    };
    let category = match &query.category {
        Some(raw) => Some(
            Category::parse(raw).ok_or_else(|| bad_request(format!("unknown category {raw:?}")))?,
        ),
        None => None,
    };
    Ok(TournamentFilter {
        month,
        year: query.year,
        is_international: query.is_international,
        tournament_type,
        category,
    })
}

async fn tournaments_handler(
    State(state): State<AppState>,
    Query(query): Query<TournamentsQuery>,
) -> Response {
    let filter = match build_filter(&query) {
        Ok(filter) => filter,
        Err(response) => return response,
    };
    let page = Page::new(query.page.unwrap_or(1), query.page_size.unwrap_or(20));

    match state.store.search(&filter, page).await {
        Ok((data, total)) => {
            let meta = PaginationMeta {
                total,
                page: page.page,
                page_size: page.page_size,
                pages: total.div_ceil(u64::from(page.page_size)),
            };
            Json(TournamentsResponse {
                status: "success",
                data,
                meta,
            })
            .into_response()
        }
        Err(err) => store_error(err),
    }
}

async fn months_handler(State(state): State<AppState>) -> Response {
    match state.store.distinct_months().await {
        Ok(months) => Json(ListResponse {
            status: "success",
            data: months,
        })
        .into_response(),
        Err(err) => store_error(err),
    }
}

async fn years_handler(State(state): State<AppState>) -> Response {
    match state.store.distinct_years().await {
        Ok(years) => Json(ListResponse {
            status: "success",
            data: years,
        })
        .into_response(),
        Err(err) => store_error(err),
    }
}

async fn categories_handler(State(state): State<AppState>) -> Response {
    match state.store.distinct_categories().await {
        Ok(categories) => Json(ListResponse {
            status: "success",
            data: categories,
        })
        .into_response(),
        Err(err) => store_error(err),
    }
}

async fn crawl_handler(State(state): State<AppState>) -> Response {
    let Some(orchestrator) = &state.orchestrator else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                status: "error",
                message: "crawl pipeline is not attached to this server".to_string(),
            }),
        )
            .into_response();
    };

    match orchestrator.run_once().await {
        RunReport::Skipped => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "skipped",
                "message": "a crawl is already in progress"
            })),
        )
            .into_response(),
        RunReport::Finished(summary) => {
            let status_code = match summary.status {
                RunStatus::Completed => StatusCode::OK,
                RunStatus::Failed { .. } => StatusCode::BAD_GATEWAY,
            };
            (
                status_code,
                Json(serde_json::json!({
                    "status": "success",
                    "summary": summary
                })),
            )
                .into_response()
        }
    }
}
