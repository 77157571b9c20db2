//! Alert lifecycle: claim creation and delivery-outcome recording.
//!
//! Persistence is authoritative, delivery is best-effort metadata: the alert
//! row is written first and stands regardless of what the mail transport
//! does afterwards. The creation response carries `email_sent` separately so
//! a caller can distinguish "claim recorded" from "owner actually notified".

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::mail::{Mailer, SendOutcome, templates};
use crate::model::{Alert, CreateAlertRequest, CreatedAlert, DeliveryStatus};
use crate::storage::Storage;

/// File a finder's claim against an item and notify the owner.
///
/// Fails with `NotFound` when the item no longer exists at creation time and
/// with `Validation` when required claim fields are blank. On success the
/// alert is persisted pending/pending, the owner notification is attempted
/// synchronously, and the delivery outcome is recorded on the alert before
/// returning.
pub async fn create_alert(
    storage: &Storage,
    mailer: &dyn Mailer,
    app_url: &str,
    request: CreateAlertRequest,
) -> Result<CreatedAlert> {
    if request.found_location.trim().is_empty() {
        return Err(Error::validation("found_location is required"));
    }
    if request.finder_email.trim().is_empty() {
        return Err(Error::validation("finder_email is required"));
    }

    // The owner's email comes off the item record, so the item must still
    // exist when the claim is filed.
    let item = storage
        .find_item(request.item_id)
        .await?
        .ok_or(Error::NotFound("item"))?;

    let alert = storage.create_alert(&request).await?;

    info!(
        alert_id = alert.id,
        item_id = item.id,
        finder = %alert.finder_email,
        "Claim recorded"
    );

    let email = templates::claim_notification(&item, &alert, app_url);
    let outcome = mailer.send(&email).await;

    if !outcome.success {
        warn!(
            alert_id = alert.id,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "Owner notification failed"
        );
    }

    let alert = record_delivery_outcome(storage, &alert, &outcome).await?;

    Ok(CreatedAlert {
        success: true,
        email_sent: outcome.success,
        alert,
    })
}

/// Record the result of a delivery attempt on the alert, and bump the parent
/// item's notification counters when the attempt succeeded.
///
/// Returns the alert with its delivery fields updated.
pub async fn record_delivery_outcome(
    storage: &Storage,
    alert: &Alert,
    outcome: &SendOutcome,
) -> Result<Alert> {
    let delivery_status = if outcome.success {
        DeliveryStatus::Sent
    } else {
        DeliveryStatus::Failed
    };

    storage
        .record_alert_delivery(
            alert.id,
            delivery_status,
            outcome.transport_id.as_deref(),
            outcome.error.as_deref(),
        )
        .await?;

    if outcome.success {
        storage
            .record_item_notification(alert.item_id, Utc::now())
            .await?;
    }

    let mut updated = alert.clone();
    updated.delivery_status = delivery_status;
    updated.transport_id = outcome.transport_id.clone();
    updated.delivery_error = outcome.error.clone();
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use crate::mail::MemoryMailer;
    use crate::model::{Category, CreateItemRequest, ReportType};

    use super::*;

    async fn setup() -> Storage {
        Storage::new("sqlite::memory:").await.unwrap()
    }

    async fn file_item(storage: &Storage) -> crate::model::Item {
        storage
            .create_item(&CreateItemRequest {
                item_name: "Blue Hydroflask".to_string(),
                report_type: ReportType::Lost,
                category: Category::Accessories,
                description: "Dented at the base".to_string(),
                date_lost: Utc::now(),
                last_seen_location: "Library".to_string(),
                owner_email: "alice@uni.edu".to_string(),
                image_url: None,
            })
            .await
            .unwrap()
    }

    fn claim(item_id: i64) -> CreateAlertRequest {
        CreateAlertRequest {
            item_id,
            finder_email: "bob@uni.edu".to_string(),
            found_location: "Cafeteria".to_string(),
            mobile: None,
            department: None,
            message: Some("Found it under a table".to_string()),
            found_image_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_alert_notifies_owner() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();
        let item = file_item(&storage).await;

        let created = create_alert(&storage, &mailer, "http://localhost:3000", claim(item.id))
            .await
            .unwrap();

        assert!(created.success);
        assert!(created.email_sent);
        assert_eq!(created.alert.delivery_status, DeliveryStatus::Sent);
        assert!(created.alert.transport_id.is_some());

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@uni.edu");
        assert_eq!(sent[0].reply_to.as_deref(), Some("bob@uni.edu"));

        // Delivery success bumps the item's notification counters
        let item = storage.find_item(item.id).await.unwrap().unwrap();
        assert_eq!(item.notification_count, 1);
        assert!(item.last_notified_at.is_some());
    }

    #[tokio::test]
    async fn test_create_alert_missing_item() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();

        let err = create_alert(&storage, &mailer, "http://localhost:3000", claim(999))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_create_alert_blank_location() {
        let storage = setup().await;
        let mailer = MemoryMailer::new();
        let item = file_item(&storage).await;

        let mut request = claim(item.id);
        request.found_location = "  ".to_string();

        let err = create_alert(&storage, &mailer, "http://localhost:3000", request)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_is_recorded_not_raised() {
        let storage = setup().await;
        let mailer = MemoryMailer::failing("relay refused");
        let item = file_item(&storage).await;

        let created = create_alert(&storage, &mailer, "http://localhost:3000", claim(item.id))
            .await
            .unwrap();

        // The claim itself persisted; only the delivery is marked failed
        assert!(created.success);
        assert!(!created.email_sent);
        assert_eq!(created.alert.delivery_status, DeliveryStatus::Failed);
        assert_eq!(created.alert.delivery_error.as_deref(), Some("relay refused"));

        let stored = storage.find_alert(created.alert.id).await.unwrap().unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Failed);

        // No counter bump on failure
        let item = storage.find_item(item.id).await.unwrap().unwrap();
        assert_eq!(item.notification_count, 0);
        assert!(item.last_notified_at.is_none());
    }
}
