//! Resolution coordinator: applies an owner's match/unmatch/accept decision
//! and its cascading effects.
//!
//! Three decision paths operate on a pending alert:
//!
//! - [`resolve_match`]: deletes the item, resolves the alert, notifies the
//!   finder, closes sibling claims. No reputation logic.
//! - [`resolve_unmatch`]: rejects the alert and notifies the finder. Never
//!   touches the item or reputation.
//! - [`resolve_accept`]: the legacy confirm path — deletes the item, awards
//!   the finder reputation (with the Trusted Finder badge at threshold) and
//!   notifies them. Does NOT close sibling claims.
//!
//! Match and Accept overlap deliberately: only Accept scores reputation and
//! only Match cascades sibling closure. Unifying them changes observable
//! behavior, so both are kept as-is.
//!
//! Every path takes the decision through an atomic compare-and-set on the
//! alert's status, so a simultaneous double-fire on the same alert commits
//! exactly once; the loser is told the alert was already decided before any
//! of its side effects run. Item deletion tolerates a row that is already
//! gone. A failed outcome email never rolls the decision back — the
//! committed state stands and the failure is reported as metadata.

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::mail::{Mailer, templates};
use crate::model::{AlertStatus, FIND_AWARD_POINTS, ResolveAck};
use crate::storage::Storage;

/// Fallback meeting instructions when the owner supplies none.
const DEFAULT_MEETING_DETAILS: &str =
    "The owner has confirmed this is their item. Please coordinate to return it.";

/// Item name shown to the finder when the referenced item is already gone.
const MISSING_ITEM_NAME: &str = "Found Item";

/// The owner confirmed the finder's claim: the match path.
///
/// Preconditions: the alert exists and is still pending; the referenced
/// item exists (a prior concurrent resolution that already deleted it is an
/// error here, not a silent success). Effects: permanent item deletion,
/// alert resolved, finder notified with the owner's meeting details, every
/// still-pending sibling claim closed.
pub async fn resolve_match(
    storage: &Storage,
    mailer: &dyn Mailer,
    alert_id: i64,
    meeting_details: Option<String>,
) -> Result<ResolveAck> {
    let alert = storage
        .find_alert(alert_id)
        .await?
        .ok_or(Error::NotFound("alert"))?;
    let item = storage
        .find_item(alert.item_id)
        .await?
        .ok_or(Error::NotFound("item"))?;

    // The CAS is the double-fire guard: it must win before any destructive
    // work happens.
    if !storage
        .transition_alert_status(alert.id, AlertStatus::Resolved)
        .await?
    {
        return Err(Error::validation("alert already decided"));
    }

    if !storage.delete_item(alert.item_id).await? {
        warn!(
            item_id = alert.item_id,
            alert_id = alert.id,
            "Item already deleted by a concurrent resolution"
        );
    }

    let details = meeting_details
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MEETING_DETAILS.to_string());

    let email = templates::owner_confirmation(&alert.finder_email, &item.item_name, &details);
    let outcome = mailer.send(&email).await;
    if !outcome.success {
        warn!(
            alert_id = alert.id,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "Match confirmation email failed"
        );
    }

    // Stale claims must not linger against an item that no longer exists
    let closed = storage.close_sibling_alerts(alert.item_id, alert.id).await?;

    info!(
        alert_id = alert.id,
        item_id = alert.item_id,
        siblings_closed = closed,
        "Match confirmed, item deleted"
    );

    Ok(ResolveAck {
        success: true,
        message: "Item matched and deleted".to_string(),
        email_sent: outcome.success,
    })
}

/// The owner determined the claim is not their item: the unmatch path.
///
/// The item is intentionally not required to exist — an owner may reject a
/// claim even after the item was separately deleted; the notification then
/// falls back to a placeholder item name. Never deletes the item and never
/// touches reputation.
pub async fn resolve_unmatch(
    storage: &Storage,
    mailer: &dyn Mailer,
    alert_id: i64,
) -> Result<ResolveAck> {
    let alert = storage
        .find_alert(alert_id)
        .await?
        .ok_or(Error::NotFound("alert"))?;

    if !storage
        .transition_alert_status(alert.id, AlertStatus::Rejected)
        .await?
    {
        return Err(Error::validation("alert already decided"));
    }

    let item_name = storage
        .find_item(alert.item_id)
        .await?
        .map(|item| item.item_name)
        .unwrap_or_else(|| MISSING_ITEM_NAME.to_string());

    let email = templates::rejection(&alert.finder_email, &item_name);
    let outcome = mailer.send(&email).await;
    if !outcome.success {
        warn!(
            alert_id = alert.id,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "Rejection email failed"
        );
    }

    info!(alert_id = alert.id, item_id = alert.item_id, "Claim rejected");

    Ok(ResolveAck {
        success: true,
        message: "Unmatch confirmed".to_string(),
        email_sent: outcome.success,
    })
}

/// The owner confirmed the claim via the legacy accept path.
///
/// Functionally overlaps with [`resolve_match`] but additionally awards the
/// finder reputation — and, at the 50-point threshold, the Trusted Finder
/// badge — and does NOT cascade sibling closure.
pub async fn resolve_accept(
    storage: &Storage,
    mailer: &dyn Mailer,
    alert_id: i64,
    meeting_details: Option<String>,
) -> Result<ResolveAck> {
    let alert = storage
        .find_alert(alert_id)
        .await?
        .ok_or(Error::NotFound("alert"))?;
    let item = storage
        .find_item(alert.item_id)
        .await?
        .ok_or(Error::NotFound("item"))?;

    if !storage
        .transition_alert_status(alert.id, AlertStatus::Accepted)
        .await?
    {
        return Err(Error::validation("alert already decided"));
    }

    if !storage.delete_item(alert.item_id).await? {
        warn!(
            item_id = alert.item_id,
            alert_id = alert.id,
            "Item already deleted by a concurrent resolution"
        );
    }

    // Reputation is only scored when the finder has a user record; claims
    // can be filed by addresses the identity layer has not synced yet.
    if let Some(mut finder) = storage.find_user(&alert.finder_email).await? {
        finder.apply_award(FIND_AWARD_POINTS);
        storage
            .update_user_reputation(&finder.email, finder.reputation_points, &finder.badges)
            .await?;

        info!(
            finder = %finder.email,
            total = finder.reputation_points,
            "Reputation awarded"
        );
    }

    let details = meeting_details
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MEETING_DETAILS.to_string());

    let email = templates::owner_confirmation(&alert.finder_email, &item.item_name, &details);
    let outcome = mailer.send(&email).await;
    if !outcome.success {
        warn!(
            alert_id = alert.id,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "Accept confirmation email failed"
        );
    }

    info!(
        alert_id = alert.id,
        item_id = alert.item_id,
        "Claim accepted, item deleted"
    );

    Ok(ResolveAck {
        success: true,
        message: "Item accepted and deleted".to_string(),
        email_sent: outcome.success,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::mail::MemoryMailer;
    use crate::model::{Category, CreateAlertRequest, CreateItemRequest, ReportType};

    use super::*;

    async fn setup() -> Storage {
        Storage::new("sqlite::memory:").await.unwrap()
    }

    async fn file_item(storage: &Storage, name: &str) -> crate::model::Item {
        storage
            .create_item(&CreateItemRequest {
                item_name: name.to_string(),
                report_type: ReportType::Lost,
                category: Category::Accessories,
                description: format!("{name} description"),
                date_lost: Utc::now(),
                last_seen_location: "Library".to_string(),
                owner_email: "alice@uni.edu".to_string(),
                image_url: None,
            })
            .await
            .unwrap()
    }

    async fn file_claim(storage: &Storage, item_id: i64, finder: &str) -> crate::model::Alert {
        storage
            .create_alert(&CreateAlertRequest {
                item_id,
                finder_email: finder.to_string(),
                found_location: "Cafeteria".to_string(),
                mobile: None,
                department: None,
                message: None,
                found_image_url: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_match_deletes_item_and_closes_siblings() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        let item = file_item(&storage, "Blue Hydroflask").await;
        let winner = file_claim(&storage, item.id, "bob@uni.edu").await;
        let sibling = file_claim(&storage, item.id, "carol@uni.edu").await;

        let ack = resolve_match(&storage, &mailer, winner.id, Some("Meet at the library desk".to_string()))
            .await
            .unwrap();

        assert!(ack.success);
        assert!(ack.email_sent);

        // Item X is no longer resolvable by id
        assert!(storage.find_item(item.id).await.unwrap().is_none());

        let winner = storage.find_alert(winner.id).await.unwrap().unwrap();
        assert_eq!(winner.status, AlertStatus::Resolved);

        let sibling = storage.find_alert(sibling.id).await.unwrap().unwrap();
        assert_eq!(sibling.status, AlertStatus::Closed);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "bob@uni.edu");
        assert!(sent[0].html_body.contains("Meet at the library desk"));
    }

    #[tokio::test]
    async fn test_match_default_meeting_details() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        let item = file_item(&storage, "Scarf").await;
        let alert = file_claim(&storage, item.id, "bob@uni.edu").await;

        resolve_match(&storage, &mailer, alert.id, None).await.unwrap();

        assert!(mailer.sent()[0].html_body.contains(DEFAULT_MEETING_DETAILS));
    }

    #[tokio::test]
    async fn test_match_missing_alert() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        let err = resolve_match(&storage, &mailer, 999, None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound("alert")));
    }

    #[tokio::test]
    async fn test_match_second_call_is_not_a_crash() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        let item = file_item(&storage, "Wallet").await;
        let first = file_claim(&storage, item.id, "bob@uni.edu").await;
        let second = file_claim(&storage, item.id, "carol@uni.edu").await;

        resolve_match(&storage, &mailer, first.id, None).await.unwrap();

        // The sibling was closed and the item is gone: deciding it now is a
        // NotFound on the item lookup, not a crash
        let err = resolve_match(&storage, &mailer, second.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound("item")));

        // Re-matching the already-resolved alert also fails cleanly
        let err = resolve_match(&storage, &mailer, first.id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound("item")));
    }

    #[tokio::test]
    async fn test_unmatch_preserves_item_and_reputation() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        storage.upsert_user("bob@uni.edu", None).await.unwrap();
        let item = file_item(&storage, "Keys").await;
        let alert = file_claim(&storage, item.id, "bob@uni.edu").await;

        let ack = resolve_unmatch(&storage, &mailer, alert.id).await.unwrap();
        assert!(ack.success);

        // Item untouched, reputation untouched
        assert!(storage.find_item(item.id).await.unwrap().is_some());
        let finder = storage.find_user("bob@uni.edu").await.unwrap().unwrap();
        assert_eq!(finder.reputation_points, 0);

        let alert = storage.find_alert(alert.id).await.unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::Rejected);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "bob@uni.edu");
        assert!(sent[0].subject.contains("Keys"));
    }

    #[tokio::test]
    async fn test_unmatch_with_deleted_item_uses_placeholder() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        let item = file_item(&storage, "Keys").await;
        let alert = file_claim(&storage, item.id, "bob@uni.edu").await;
        storage.delete_item(item.id).await.unwrap();

        let ack = resolve_unmatch(&storage, &mailer, alert.id).await.unwrap();
        assert!(ack.success);
        assert!(mailer.sent()[0].subject.contains(MISSING_ITEM_NAME));
    }

    #[tokio::test]
    async fn test_accept_awards_reputation_and_badge() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        storage.upsert_user("bob@uni.edu", None).await.unwrap();
        storage
            .update_user_reputation("bob@uni.edu", 45, &[])
            .await
            .unwrap();

        let item = file_item(&storage, "Blue Hydroflask").await;
        let alert = file_claim(&storage, item.id, "bob@uni.edu").await;

        let ack = resolve_accept(&storage, &mailer, alert.id, Some("Student Center, 3pm".to_string()))
            .await
            .unwrap();
        assert!(ack.success);

        assert!(storage.find_item(item.id).await.unwrap().is_none());

        let finder = storage.find_user("bob@uni.edu").await.unwrap().unwrap();
        assert_eq!(finder.reputation_points, 55);
        assert_eq!(finder.badges, vec!["Trusted Finder".to_string()]);

        let alert = storage.find_alert(alert.id).await.unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::Accepted);

        assert!(mailer.sent()[0].html_body.contains("Student Center, 3pm"));
    }

    #[tokio::test]
    async fn test_second_accept_does_not_duplicate_badge() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        storage.upsert_user("bob@uni.edu", None).await.unwrap();
        storage
            .update_user_reputation("bob@uni.edu", 45, &[])
            .await
            .unwrap();

        let first_item = file_item(&storage, "Hydroflask").await;
        let first = file_claim(&storage, first_item.id, "bob@uni.edu").await;
        resolve_accept(&storage, &mailer, first.id, None).await.unwrap();

        let second_item = file_item(&storage, "Charger").await;
        let second = file_claim(&storage, second_item.id, "bob@uni.edu").await;
        resolve_accept(&storage, &mailer, second.id, None).await.unwrap();

        let finder = storage.find_user("bob@uni.edu").await.unwrap().unwrap();
        assert_eq!(finder.reputation_points, 65);
        assert_eq!(finder.badges.len(), 1);
    }

    #[tokio::test]
    async fn test_accept_without_user_record() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        let item = file_item(&storage, "Scarf").await;
        let alert = file_claim(&storage, item.id, "stranger@uni.edu").await;

        // No user row for the finder: the item is still deleted and the
        // email still sent, but no reputation record appears
        let ack = resolve_accept(&storage, &mailer, alert.id, None).await.unwrap();
        assert!(ack.success);
        assert!(storage.find_item(item.id).await.unwrap().is_none());
        assert!(storage.find_user("stranger@uni.edu").await.unwrap().is_none());
        assert_eq!(mailer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_accept_does_not_close_siblings() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        let item = file_item(&storage, "Wallet").await;
        let winner = file_claim(&storage, item.id, "bob@uni.edu").await;
        let sibling = file_claim(&storage, item.id, "carol@uni.edu").await;

        resolve_accept(&storage, &mailer, winner.id, None).await.unwrap();

        // Divergence from the match path: siblings stay pending
        let sibling = storage.find_alert(sibling.id).await.unwrap().unwrap();
        assert_eq!(sibling.status, AlertStatus::Pending);
    }

    #[tokio::test]
    async fn test_decided_alert_rejects_further_decisions() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        let item = file_item(&storage, "Keys").await;
        let alert = file_claim(&storage, item.id, "bob@uni.edu").await;

        resolve_unmatch(&storage, &mailer, alert.id).await.unwrap();

        let err = resolve_unmatch(&storage, &mailer, alert.id).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // The item survived both calls
        assert!(storage.find_item(item.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_roll_back() {
        let storage = setup().await;
        let mailer = MemoryMailer::failing("relay refused");

        let item = file_item(&storage, "Laptop").await;
        let alert = file_claim(&storage, item.id, "bob@uni.edu").await;

        let ack = resolve_match(&storage, &mailer, alert.id, None).await.unwrap();

        // Partial success: the decision stands, only the email is lost
        assert!(ack.success);
        assert!(!ack.email_sent);
        assert!(storage.find_item(item.id).await.unwrap().is_none());
        let alert = storage.find_alert(alert.id).await.unwrap().unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
    }
}
