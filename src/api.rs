//! HTTP API handlers for Reclaim.
//!
//! Identity is an upstream concern: every handler trusts the verified email
//! addresses it is given and performs only ownership checks, never
//! authentication.
//!
//! Decision and delivery failures are kept apart throughout: a handler
//! returns an error status only when canonical state could not be read or
//! mutated. A failed notification email is reported inside a 2xx body
//! (`email_sent: false`) because the committed decision stands either way.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::Error;
use crate::mail::{Mailer, templates};
use crate::model::{
    Alert, Category, CreateAlertRequest, CreateItemRequest, CreatedAlert, Item, ResolveAck,
    ResolveRequest, SyncUserRequest, User,
};
use crate::storage::{ItemFilter, Storage};
use crate::{alerts, matching, resolution};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    /// The one configured outbound channel.
    pub mailer: Arc<dyn Mailer>,
    /// Base URL embedded in claim links.
    pub app_url: String,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/items",
            post(post_item).get(get_items).patch(mark_item_resolved),
        )
        .route("/items/:id", delete(delete_item))
        .route("/alerts", post(post_alert))
        .route("/alerts/:id", get(get_alert))
        .route("/alerts/:id/match", post(post_match))
        .route("/alerts/:id/unmatch", post(post_unmatch))
        .route("/alerts/:id/accept", post(post_accept))
        .route("/users/sync", post(sync_user))
        .route("/stats/user/:email", get(user_stats))
        .route("/stats/admin", get(admin_stats))
        .route("/mail/test", get(test_mail))
        .route("/health", get(health_check))
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            Error::Internal(e) => {
                error!(error = %e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

// ============================================================================
// Items
// ============================================================================

/// POST /items - File a new lost or found report.
///
/// Creating the report and scanning for counterparts are decoupled: the
/// matching pass runs on a spawned task so its store reads and email
/// dispatches can never delay or fail report creation.
#[instrument(skip(state, request))]
pub async fn post_item(
    State(state): State<AppState>,
    Json(request): Json<CreateItemRequest>,
) -> Result<(StatusCode, Json<Item>), Error> {
    for (field, value) in [
        ("item_name", &request.item_name),
        ("description", &request.description),
        ("last_seen_location", &request.last_seen_location),
        ("owner_email", &request.owner_email),
    ] {
        if value.trim().is_empty() {
            return Err(Error::validation(format!("{field} is required")));
        }
    }

    let item = state.storage.create_item(&request).await?;

    info!(
        item_id = item.id,
        report_type = item.report_type.as_str(),
        category = item.category.as_str(),
        "Report filed"
    );

    let spawned = state.clone();
    let new_item = item.clone();
    tokio::spawn(async move {
        matching::correlate(
            &spawned.storage,
            spawned.mailer.as_ref(),
            &spawned.app_url,
            &new_item,
        )
        .await;
    });

    Ok((StatusCode::CREATED, Json(item)))
}

/// Query parameters for GET /items.
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Substring match against name or description.
    pub search: Option<String>,

    /// Category name, or "All" for no filter.
    pub category: Option<String>,

    /// Substring match against the last-seen location.
    pub location: Option<String>,

    /// Owner view: all of this reporter's items, including resolved ones.
    pub owner_email: Option<String>,
}

/// A feed entry: the item plus its owner's reputation standing.
#[derive(Debug, Serialize)]
pub struct FeedItem {
    #[serde(flatten)]
    pub item: Item,
    pub owner_reputation: i64,
    pub owner_badges: Vec<String>,
}

/// GET /items - The report feed.
///
/// Public view lists unresolved reports, newest first; passing `owner_email`
/// switches to that reporter's full history. Entries are enriched with the
/// owner's reputation points and badges.
#[instrument(skip(state))]
pub async fn get_items(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<FeedItem>>, Error> {
    let category = match query.category.as_deref() {
        None | Some("All") => None,
        Some(raw) => Some(
            Category::parse(raw).ok_or_else(|| Error::validation(format!("unknown category: {raw}")))?,
        ),
    };

    let items = state
        .storage
        .list_items(&ItemFilter {
            search: query.search.clone(),
            category,
            location: query.location.clone(),
            owner_email: query.owner_email.clone(),
        })
        .await?;

    let mut feed = Vec::with_capacity(items.len());
    for item in items {
        let owner = state.storage.find_user(&item.owner_email).await?;
        let (owner_reputation, owner_badges) = match owner {
            Some(user) => (user.reputation_points, user.badges),
            None => (0, Vec::new()),
        };
        feed.push(FeedItem {
            item,
            owner_reputation,
            owner_badges,
        });
    }

    Ok(Json(feed))
}

/// Request body for PATCH /items.
#[derive(Debug, Deserialize)]
pub struct MarkResolvedRequest {
    pub id: i64,
    /// Must match the item's owner.
    pub owner_email: String,
}

/// PATCH /items - Owner marks a report resolved.
///
/// The flip is monotonic; there is no endpoint that un-resolves a report.
#[instrument(skip(state))]
pub async fn mark_item_resolved(
    State(state): State<AppState>,
    Json(request): Json<MarkResolvedRequest>,
) -> Result<Json<serde_json::Value>, Error> {
    let item = state
        .storage
        .find_item(request.id)
        .await?
        .ok_or(Error::NotFound("item"))?;

    if item.owner_email != request.owner_email {
        return Err(Error::Forbidden("not the owner of this item"));
    }

    state.storage.mark_item_resolved(request.id).await?;

    info!(item_id = request.id, "Report marked resolved");

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Query parameters for DELETE /items/:id.
#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_email: String,
}

/// DELETE /items/:id - Owner deletes a report outright.
///
/// Deletion is terminal. Claims on the item are never deleted with it; every
/// still-pending one transitions to closed so it cannot later be decided
/// against an item that no longer exists.
#[instrument(skip(state))]
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<serde_json::Value>, Error> {
    let item = state
        .storage
        .find_item(id)
        .await?
        .ok_or(Error::NotFound("item"))?;

    if item.owner_email != query.owner_email {
        return Err(Error::Forbidden("not the owner of this item"));
    }

    state.storage.delete_item(id).await?;
    let closed = state.storage.close_alerts_for_item(id).await?;

    info!(item_id = id, alerts_closed = closed, "Report deleted by owner");

    Ok(Json(
        serde_json::json!({ "success": true, "message": "Item deleted successfully" }),
    ))
}

// ============================================================================
// Alerts
// ============================================================================

/// POST /alerts - File a finder's claim and notify the owner.
///
/// The response separates persistence from delivery: `email_sent` is false
/// when the claim was recorded but the owner notification failed.
#[instrument(skip(state, request))]
pub async fn post_alert(
    State(state): State<AppState>,
    Json(request): Json<CreateAlertRequest>,
) -> Result<(StatusCode, Json<CreatedAlert>), Error> {
    let created = alerts::create_alert(
        &state.storage,
        state.mailer.as_ref(),
        &state.app_url,
        request,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Response for GET /alerts/:id.
#[derive(Debug, Serialize)]
pub struct ClaimView {
    pub alert: Alert,
    pub item: Item,
}

/// GET /alerts/:id - The claim view backing the emailed verification link.
#[instrument(skip(state))]
pub async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ClaimView>, Error> {
    let alert = state
        .storage
        .find_alert(id)
        .await?
        .ok_or(Error::NotFound("alert"))?;
    let item = state
        .storage
        .find_item(alert.item_id)
        .await?
        .ok_or(Error::NotFound("item"))?;

    Ok(Json(ClaimView { alert, item }))
}

/// POST /alerts/:id/match - Owner confirms the claim.
#[instrument(skip(state, body))]
pub async fn post_match(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<ResolveRequest>>,
) -> Result<Json<ResolveAck>, Error> {
    let meeting_details = body.and_then(|Json(request)| request.meeting_details);

    let ack =
        resolution::resolve_match(&state.storage, state.mailer.as_ref(), id, meeting_details)
            .await?;

    Ok(Json(ack))
}

/// POST /alerts/:id/unmatch - Owner rejects the claim.
#[instrument(skip(state))]
pub async fn post_unmatch(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ResolveAck>, Error> {
    let ack = resolution::resolve_unmatch(&state.storage, state.mailer.as_ref(), id).await?;

    Ok(Json(ack))
}

/// POST /alerts/:id/accept - Owner confirms via the legacy accept path,
/// which additionally awards the finder reputation.
#[instrument(skip(state, body))]
pub async fn post_accept(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<ResolveRequest>>,
) -> Result<Json<ResolveAck>, Error> {
    let meeting_details = body.and_then(|Json(request)| request.meeting_details);

    let ack =
        resolution::resolve_accept(&state.storage, state.mailer.as_ref(), id, meeting_details)
            .await?;

    Ok(Json(ack))
}

// ============================================================================
// Users and stats
// ============================================================================

/// POST /users/sync - Upsert the reputation record for a verified email.
#[instrument(skip(state))]
pub async fn sync_user(
    State(state): State<AppState>,
    Json(request): Json<SyncUserRequest>,
) -> Result<Json<User>, Error> {
    if request.email.trim().is_empty() {
        return Err(Error::validation("email is required"));
    }

    let user = state
        .storage
        .upsert_user(&request.email, request.full_name.as_deref())
        .await?;

    Ok(Json(user))
}

/// Response for GET /stats/user/:email.
#[derive(Debug, Serialize)]
pub struct UserStats {
    pub items_posted: i64,
    pub items_recovered: i64,
    pub alerts_sent: i64,
    pub reputation_points: i64,
    pub badges: Vec<String>,
}

/// GET /stats/user/:email - One account's activity and reputation standing.
#[instrument(skip(state))]
pub async fn user_stats(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<UserStats>, Error> {
    let user = state.storage.find_user(&email).await?;
    let (reputation_points, badges) = match user {
        Some(user) => (user.reputation_points, user.badges),
        None => (0, Vec::new()),
    };

    Ok(Json(UserStats {
        items_posted: state.storage.count_items_for_owner(&email).await?,
        items_recovered: state
            .storage
            .count_recovered_items_for_owner(&email)
            .await?,
        alerts_sent: state.storage.count_alerts_for_finder(&email).await?,
        reputation_points,
        badges,
    }))
}

/// Response for GET /stats/admin.
#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub total_items: i64,
    pub resolved_items: i64,
    pub active_items: i64,
    pub total_alerts: i64,
}

/// GET /stats/admin - Global platform counts.
#[instrument(skip(state))]
pub async fn admin_stats(State(state): State<AppState>) -> Result<Json<AdminStats>, Error> {
    let total_items = state.storage.count_items().await?;
    let resolved_items = state.storage.count_resolved_items().await?;
    let total_alerts = state.storage.count_alerts().await?;

    Ok(Json(AdminStats {
        total_items,
        resolved_items,
        active_items: total_items - resolved_items,
        total_alerts,
    }))
}

// ============================================================================
// Mail probe and health
// ============================================================================

/// Query parameters for GET /mail/test.
#[derive(Debug, Deserialize)]
pub struct TestMailQuery {
    pub email: String,
}

/// GET /mail/test - Send a probe email through the configured transport.
#[instrument(skip(state))]
pub async fn test_mail(
    State(state): State<AppState>,
    Query(query): Query<TestMailQuery>,
) -> Json<serde_json::Value> {
    let outcome = state.mailer.send(&templates::probe(&query.email)).await;

    Json(serde_json::json!({
        "success": outcome.success,
        "transport_id": outcome.transport_id,
        "error": outcome.error,
    }))
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
