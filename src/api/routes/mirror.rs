//! Mirror handlers: change check, full run, single item, verification.

use super::{CrawlItemQuery, OfflineQuery, VerifyQuery};
use crate::api::AppState;
use crate::error::Result;
use crate::types::{ChangeReport, ContentKind, ItemOutcome, RunReport};
use crate::verify::VerifyReport;
use axum::{
    Json,
    extract::{Path, Query, State},
};

/// GET /watch - Check whether the remote index changed
#[utoipa::path(
    get,
    path = "/api/v1/watch",
    tag = "mirror",
    params(("offline" = Option<bool>, Query, description = "Use the offline replay source")),
    responses(
        (status = 200, description = "Change detection result", body = crate::types::ChangeReport),
        (status = 502, description = "Index could not be fetched or was malformed", body = crate::error::ApiError),
        (status = 500, description = "Index could not be persisted", body = crate::error::ApiError)
    )
)]
pub async fn watch(
    State(state): State<AppState>,
    Query(query): Query<OfflineQuery>,
) -> Result<Json<ChangeReport>> {
    let change = state.mirror.check_for_update(query.offline).await?;
    Ok(Json(change))
}

/// POST /crawl/run - Run every stage regardless of change
///
/// Always answers 200; a failing stage is reported as `success=false` with
/// `failed_stage` and `error`.
#[utoipa::path(
    post,
    path = "/api/v1/crawl/run",
    tag = "mirror",
    params(("offline" = Option<bool>, Query, description = "Use the offline replay source")),
    responses(
        (status = 200, description = "Run report", body = crate::types::RunReport)
    )
)]
pub async fn crawl_run(
    State(state): State<AppState>,
    Query(query): Query<OfflineQuery>,
) -> Json<RunReport> {
    Json(state.mirror.run_full(query.offline).await)
}

/// POST /crawl/item/:kind/:id - Materialize one item
#[utoipa::path(
    post,
    path = "/api/v1/crawl/item/{kind}/{id}",
    tag = "mirror",
    params(
        ("kind" = String, Path, description = "Item kind: article or section"),
        ("id" = i64, Path, description = "Item id"),
        ("force" = Option<bool>, Query, description = "Delete the local copy before fetching"),
        ("offline" = Option<bool>, Query, description = "Use the offline replay source")
    ),
    responses(
        (status = 200, description = "Item outcome", body = crate::types::ItemOutcome),
        (status = 400, description = "Unknown item kind", body = crate::error::ApiError)
    )
)]
pub async fn crawl_item(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, i64)>,
    Query(query): Query<CrawlItemQuery>,
) -> Result<Json<ItemOutcome>> {
    let kind: ContentKind = kind.parse()?;
    let outcome = state
        .mirror
        .crawl_item(kind, id, query.force, query.offline)
        .await?;
    Ok(Json(outcome))
}

/// GET /verify - Local store verification report
#[utoipa::path(
    get,
    path = "/api/v1/verify",
    tag = "mirror",
    params(("detail" = Option<bool>, Query, description = "Include the per-item issue list")),
    responses(
        (status = 200, description = "Verification report", body = crate::verify::VerifyReport)
    )
)]
pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<VerifyReport>> {
    Ok(Json(state.mirror.verify(query.detail).await?))
}
