//! Data models for Reclaim.
//!
//! Three records make up the domain:
//!
//! - [`Item`]: a lost-or-found report filed by a reporter
//! - [`Alert`]: one finder's claim against a specific item, carrying
//!   independent decision and email-delivery state
//! - [`User`]: the reputation/badge aspect of an account (identity itself is
//!   verified upstream)
//!
//! The decision axis (`status`) and the delivery axis (`delivery_status`) of
//! an [`Alert`] are deliberately independent: a claim can be fully delivered
//! yet still awaiting a human decision, or undelivered yet already decided
//! through an out-of-band channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reputation points awarded when an owner accepts a finder's claim.
pub const FIND_AWARD_POINTS: i64 = 10;

/// Reputation total at which the "Trusted Finder" badge is granted.
pub const TRUSTED_FINDER_THRESHOLD: i64 = 50;

/// The single badge tag recognized by this subsystem.
pub const TRUSTED_FINDER_BADGE: &str = "Trusted Finder";

/// Whether a report describes something lost or something found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Lost,
    Found,
}

impl ReportType {
    /// The opposite report type; a lost report is correlated against found
    /// reports and vice versa.
    pub fn counterpart(self) -> Self {
        match self {
            ReportType::Lost => ReportType::Found,
            ReportType::Found => ReportType::Lost,
        }
    }

    /// Canonical string form used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Lost => "lost",
            ReportType::Found => "found",
        }
    }

    /// Parse the canonical storage form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lost" => Some(ReportType::Lost),
            "found" => Some(ReportType::Found),
            _ => None,
        }
    }
}

/// Closed category set for reports. Matching only ever correlates items
/// within the same category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Electronics,
    Clothing,
    Books,
    Accessories,
    Other,
}

impl Category {
    /// Canonical string form used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Electronics => "Electronics",
            Category::Clothing => "Clothing",
            Category::Books => "Books",
            Category::Accessories => "Accessories",
            Category::Other => "Other",
        }
    }

    /// Parse the canonical storage form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Electronics" => Some(Category::Electronics),
            "Clothing" => Some(Category::Clothing),
            "Books" => Some(Category::Books),
            "Accessories" => Some(Category::Accessories),
            "Other" => Some(Category::Other),
            _ => None,
        }
    }
}

/// Decision state of an [`Alert`].
///
/// `Pending` is the only non-terminal state. The Resolution Coordinator
/// moves a pending alert to `Accepted`, `Resolved`, or `Rejected`; siblings
/// of a resolved alert move to `Closed` so stale claims cannot later be
/// decided against an item that no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Awaiting the owner's decision.
    Pending,
    /// Owner confirmed via the legacy accept path (reputation awarded).
    Accepted,
    /// Owner confirmed the match.
    Resolved,
    /// Owner determined it is not their item.
    Rejected,
    /// Superseded by a sibling alert's resolution, or orphaned by an
    /// owner-initiated item deletion.
    Closed,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Accepted => "accepted",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Rejected => "rejected",
            AlertStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AlertStatus::Pending),
            "accepted" => Some(AlertStatus::Accepted),
            "resolved" => Some(AlertStatus::Resolved),
            "rejected" => Some(AlertStatus::Rejected),
            "closed" => Some(AlertStatus::Closed),
            _ => None,
        }
    }

    /// Every state except `Pending` is terminal; no further transition is
    /// permitted out of it.
    pub fn is_terminal(self) -> bool {
        !matches!(self, AlertStatus::Pending)
    }
}

/// Email-delivery state of an [`Alert`], independent of the decision axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Notification not yet attempted.
    Pending,
    /// Handed to the mail transport.
    Sent,
    /// Transport reported failure; `delivery_error` holds the reason.
    Failed,
    /// Confirmed delivered by the transport (reserved; nothing in this core
    /// upgrades `Sent` to `Delivered`).
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeliveryStatus::Pending),
            "sent" => Some(DeliveryStatus::Sent),
            "failed" => Some(DeliveryStatus::Failed),
            "delivered" => Some(DeliveryStatus::Delivered),
            _ => None,
        }
    }
}

/// A lost-or-found report.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: i64,

    /// Free-text name; tokenized into keywords by the matching engine.
    pub item_name: String,

    pub report_type: ReportType,

    pub category: Category,

    pub description: String,

    /// When the item was lost (or found, for found reports).
    pub date_lost: DateTime<Utc>,

    pub last_seen_location: String,

    /// The reporter's verified email. Immutable after creation.
    pub owner_email: String,

    /// Optional uploaded image reference.
    pub image_url: Option<String>,

    /// Monotonic: flips false to true once, never back.
    pub is_resolved: bool,

    /// Number of successfully delivered claim notifications for this item.
    pub notification_count: i64,

    /// When the owner was last notified of a claim.
    pub last_notified_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// Request body for POST /items.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateItemRequest {
    pub item_name: String,

    /// Defaults to `lost` for callers that predate found reports.
    #[serde(default = "default_report_type")]
    pub report_type: ReportType,

    pub category: Category,

    pub description: String,

    pub date_lost: DateTime<Utc>,

    pub last_seen_location: String,

    /// Verified upstream; this service does not authenticate.
    pub owner_email: String,

    #[serde(default)]
    pub image_url: Option<String>,
}

fn default_report_type() -> ReportType {
    ReportType::Lost
}

/// One finder's claim that they found a specific item.
///
/// The alert references the item but does not own its lifetime: the item can
/// be deleted out from under a pending alert, which then must be handled
/// defensively. Alerts themselves are never deleted; they are kept for
/// reputation and history audit.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: i64,

    pub item_id: i64,

    pub finder_email: String,

    pub found_location: String,

    pub mobile: Option<String>,

    pub department: Option<String>,

    pub message: Option<String>,

    pub found_image_url: Option<String>,

    pub status: AlertStatus,

    pub delivery_status: DeliveryStatus,

    /// Opaque message id reported by the mail transport on success.
    pub transport_id: Option<String>,

    /// Transport error text, present only when delivery failed.
    pub delivery_error: Option<String>,

    /// Reserved for a redelivery sweep; nothing drives these yet.
    pub retry_count: i64,
    pub last_retry_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

/// Request body for POST /alerts.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAlertRequest {
    pub item_id: i64,

    /// Verified upstream.
    pub finder_email: String,

    pub found_location: String,

    #[serde(default)]
    pub mobile: Option<String>,

    #[serde(default)]
    pub department: Option<String>,

    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub found_image_url: Option<String>,
}

/// Response for POST /alerts.
///
/// `email_sent` reports the delivery attempt separately from the persisted
/// alert: persistence is authoritative, delivery is best-effort metadata.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedAlert {
    pub success: bool,
    pub alert: Alert,
    pub email_sent: bool,
}

/// Request body for the match/accept decision endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolveRequest {
    /// Free text from the owner, forwarded to the finder unvalidated.
    #[serde(default)]
    pub meeting_details: Option<String>,
}

/// Acknowledgement returned by the decision endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ResolveAck {
    pub success: bool,
    pub message: String,
    /// False when the decision was committed but the outcome email failed.
    pub email_sent: bool,
}

/// The reputation aspect of an account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Key; produced by the upstream identity collaborator.
    pub email: String,

    pub full_name: Option<String>,

    /// Monotonically non-decreasing through this subsystem.
    pub reputation_points: i64,

    /// Badge tags. Once granted, a badge is never revoked.
    pub badges: Vec<String>,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// Apply a reputation award and promote the badge when the new total
    /// crosses the threshold.
    ///
    /// The badge append is idempotent: a user already carrying the badge
    /// never receives a duplicate entry.
    pub fn apply_award(&mut self, points: i64) {
        self.reputation_points += points;

        if self.reputation_points >= TRUSTED_FINDER_THRESHOLD
            && !self.badges.iter().any(|b| b == TRUSTED_FINDER_BADGE)
        {
            self.badges.push(TRUSTED_FINDER_BADGE.to_string());
        }
    }
}

/// Request body for POST /users/sync.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncUserRequest {
    pub email: String,

    #[serde(default)]
    pub full_name: Option<String>,
}
