//! SQLite storage layer for Reclaim.
//!
//! Three tables back the domain: `items` (lost/found reports), `alerts`
//! (finder claims) and `users` (reputation records). A few contracts the
//! rest of the crate leans on:
//!
//! - Item ids are `AUTOINCREMENT` and never reused, so a deleted report can
//!   never be re-created implicitly under the same id.
//! - [`Storage::delete_item`] of an already-deleted row is a benign no-op
//!   reported through the return value, never an error.
//! - [`Storage::transition_alert_status`] is an atomic compare-and-set: the
//!   decision state only moves out of `pending` once, even under
//!   simultaneous requests for the same alert.
//! - Alerts are never deleted; closure is a status transition.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::model::{
    Alert, AlertStatus, Category, CreateAlertRequest, CreateItemRequest, DeliveryStatus, Item,
    ReportType, User,
};

/// Column list shared by every item query.
const ITEM_COLUMNS: &str = "id, item_name, report_type, category, description, date_lost, \
     last_seen_location, owner_email, image_url, is_resolved, notification_count, \
     last_notified_at, created_at";

/// Column list shared by every alert query.
const ALERT_COLUMNS: &str = "id, item_id, finder_email, found_location, mobile, department, \
     message, found_image_url, status, delivery_status, transport_id, delivery_error, \
     retry_count, last_retry_at, created_at";

/// Filters for the public item feed.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Substring match against name or description.
    pub search: Option<String>,

    pub category: Option<Category>,

    /// Substring match against the last-seen location.
    pub location: Option<String>,

    /// When set, returns all of this owner's items including resolved ones;
    /// otherwise only unresolved items are listed.
    pub owner_email: Option<String>,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:reclaim.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        // AUTOINCREMENT keeps ids monotonic so deleted item ids are never
        // handed out again.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_name TEXT NOT NULL,
                report_type TEXT NOT NULL,
                category TEXT NOT NULL,
                description TEXT NOT NULL,
                date_lost INTEGER NOT NULL,
                last_seen_location TEXT NOT NULL,
                owner_email TEXT NOT NULL,
                image_url TEXT,
                is_resolved INTEGER NOT NULL DEFAULT 0,
                notification_count INTEGER NOT NULL DEFAULT 0,
                last_notified_at INTEGER,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL,
                finder_email TEXT NOT NULL,
                found_location TEXT NOT NULL,
                mobile TEXT,
                department TEXT,
                message TEXT,
                found_image_url TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                delivery_status TEXT NOT NULL DEFAULT 'pending',
                transport_id TEXT,
                delivery_error TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_retry_at INTEGER,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                email TEXT PRIMARY KEY,
                full_name TEXT,
                reputation_points INTEGER NOT NULL DEFAULT 0,
                badges TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Index for the matching scan and the feed
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_items_type_category
            ON items(report_type, category, is_resolved)
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Index for sibling-alert lookups by item
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_alerts_item_id
            ON alerts(item_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Items
    // ========================================================================

    /// Insert a new report and return the stored record.
    pub async fn create_item(&self, request: &CreateItemRequest) -> anyhow::Result<Item> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO items (item_name, report_type, category, description, date_lost,
                               last_seen_location, owner_email, image_url, is_resolved,
                               notification_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(&request.item_name)
        .bind(request.report_type.as_str())
        .bind(request.category.as_str())
        .bind(&request.description)
        .bind(request.date_lost.timestamp())
        .bind(&request.last_seen_location)
        .bind(&request.owner_email)
        .bind(&request.image_url)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(Item {
            id: result.last_insert_rowid(),
            item_name: request.item_name.clone(),
            report_type: request.report_type,
            category: request.category,
            description: request.description.clone(),
            date_lost: request.date_lost,
            last_seen_location: request.last_seen_location.clone(),
            owner_email: request.owner_email.clone(),
            image_url: request.image_url.clone(),
            is_resolved: false,
            notification_count: 0,
            last_notified_at: None,
            created_at: now,
        })
    }

    /// Look up a report by id.
    pub async fn find_item(&self, id: i64) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(item_from_row).transpose()
    }

    /// List reports for the feed, newest first.
    pub async fn list_items(&self, filter: &ItemFilter) -> anyhow::Result<Vec<Item>> {
        let mut sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE ");
        let mut binds: Vec<String> = Vec::new();

        // The public feed shows only unresolved items; the owner view shows
        // everything the owner posted.
        if let Some(owner) = &filter.owner_email {
            sql.push_str("owner_email = ?");
            binds.push(owner.clone());
        } else {
            sql.push_str("is_resolved = 0");
        }

        if let Some(category) = filter.category {
            sql.push_str(" AND category = ?");
            binds.push(category.as_str().to_string());
        }

        if let Some(location) = &filter.location {
            sql.push_str(" AND last_seen_location LIKE ?");
            binds.push(format!("%{location}%"));
        }

        if let Some(search) = &filter.search {
            sql.push_str(" AND (item_name LIKE ? OR description LIKE ?)");
            binds.push(format!("%{search}%"));
            binds.push(format!("%{search}%"));
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(item_from_row).collect()
    }

    /// Find unresolved counterpart reports for the matching engine.
    ///
    /// Filters on the target report type, the same category, and an OR-group
    /// of keyword matches against name/description plus a location substring
    /// match. SQLite's LIKE is case-insensitive for ASCII, which is the
    /// extent of case folding required here. With no keywords and no
    /// location there is nothing for the OR-group to match, so the scan
    /// short-circuits to empty.
    pub async fn find_match_candidates(
        &self,
        target_type: ReportType,
        category: Category,
        keywords: &[String],
        location: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<Item>> {
        let mut clauses: Vec<&str> = Vec::new();
        for _ in keywords {
            clauses.push("item_name LIKE ?");
        }
        for _ in keywords {
            clauses.push("description LIKE ?");
        }
        if !location.is_empty() {
            clauses.push("last_seen_location LIKE ?");
        }

        if clauses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items \
             WHERE report_type = ? AND category = ? AND is_resolved = 0 AND ({}) \
             LIMIT ?",
            clauses.join(" OR ")
        );

        let mut query = sqlx::query(&sql)
            .bind(target_type.as_str())
            .bind(category.as_str());
        for keyword in keywords {
            query = query.bind(format!("%{keyword}%"));
        }
        for keyword in keywords {
            query = query.bind(format!("%{keyword}%"));
        }
        if !location.is_empty() {
            query = query.bind(format!("%{location}%"));
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(item_from_row).collect()
    }

    /// Flip a report to resolved. Monotonic; there is no way back.
    ///
    /// Returns false when the item does not exist.
    pub async fn mark_item_resolved(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE items SET is_resolved = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a report permanently.
    ///
    /// Returns whether a row was actually removed; deleting an
    /// already-deleted item is a benign no-op.
    pub async fn delete_item(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Bump the notification counters after a successful claim delivery.
    pub async fn record_item_notification(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE items
            SET notification_count = notification_count + 1, last_notified_at = ?
            WHERE id = ?
            "#,
        )
        .bind(at.timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Alerts
    // ========================================================================

    /// Insert a new claim with pending decision and delivery state.
    pub async fn create_alert(&self, request: &CreateAlertRequest) -> anyhow::Result<Alert> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO alerts (item_id, finder_email, found_location, mobile, department,
                                message, found_image_url, status, delivery_status,
                                retry_count, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', 'pending', 0, ?)
            "#,
        )
        .bind(request.item_id)
        .bind(&request.finder_email)
        .bind(&request.found_location)
        .bind(&request.mobile)
        .bind(&request.department)
        .bind(&request.message)
        .bind(&request.found_image_url)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(Alert {
            id: result.last_insert_rowid(),
            item_id: request.item_id,
            finder_email: request.finder_email.clone(),
            found_location: request.found_location.clone(),
            mobile: request.mobile.clone(),
            department: request.department.clone(),
            message: request.message.clone(),
            found_image_url: request.found_image_url.clone(),
            status: AlertStatus::Pending,
            delivery_status: DeliveryStatus::Pending,
            transport_id: None,
            delivery_error: None,
            retry_count: 0,
            last_retry_at: None,
            created_at: now,
        })
    }

    /// Look up a claim by id.
    pub async fn find_alert(&self, id: i64) -> anyhow::Result<Option<Alert>> {
        let row = sqlx::query(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(alert_from_row).transpose()
    }

    /// Record the outcome of a delivery attempt on the alert itself.
    pub async fn record_alert_delivery(
        &self,
        id: i64,
        status: DeliveryStatus,
        transport_id: Option<&str>,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE alerts
            SET delivery_status = ?, transport_id = ?, delivery_error = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(transport_id)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Atomically move a pending alert to a decided state.
    ///
    /// Compare-and-set on `status = 'pending'`: returns false when the alert
    /// does not exist or was already decided, in which case nothing changed.
    /// This is the guard that keeps two simultaneous decisions on the same
    /// alert from both firing their side effects.
    pub async fn transition_alert_status(
        &self,
        id: i64,
        to: AlertStatus,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE alerts SET status = ? WHERE id = ? AND status = 'pending'")
            .bind(to.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Close every still-pending sibling claim on an item, excluding the
    /// alert that triggered the cascade.
    ///
    /// Returns the number of siblings closed. Decided siblings are terminal
    /// and stay untouched.
    pub async fn close_sibling_alerts(&self, item_id: i64, except: i64) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE alerts SET status = 'closed' WHERE item_id = ? AND id != ? AND status = 'pending'",
        )
        .bind(item_id)
        .bind(except)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Close every still-pending claim on an item (owner-initiated deletion:
    /// the item is gone, so no pending claim can ever be decided).
    pub async fn close_alerts_for_item(&self, item_id: i64) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE alerts SET status = 'closed' WHERE item_id = ? AND status = 'pending'",
        )
        .bind(item_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Look up a reputation record by email.
    pub async fn find_user(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(
            "SELECT email, full_name, reputation_points, badges, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Create or refresh a user record for a verified email.
    pub async fn upsert_user(
        &self,
        email: &str,
        full_name: Option<&str>,
    ) -> anyhow::Result<User> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (email, full_name, reputation_points, badges, created_at)
            VALUES (?, ?, 0, '[]', ?)
            ON CONFLICT(email) DO UPDATE SET
                full_name = COALESCE(excluded.full_name, users.full_name)
            "#,
        )
        .bind(email)
        .bind(full_name)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        self.find_user(email)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user vanished after upsert"))
    }

    /// Persist an updated reputation total and badge set.
    pub async fn update_user_reputation(
        &self,
        email: &str,
        reputation_points: i64,
        badges: &[String],
    ) -> anyhow::Result<()> {
        let badges_json = serde_json::to_string(badges)?;

        sqlx::query("UPDATE users SET reputation_points = ?, badges = ? WHERE email = ?")
            .bind(reputation_points)
            .bind(badges_json)
            .bind(email)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ========================================================================
    // Counts
    // ========================================================================

    /// Total number of reports ever filed (minus deletions).
    pub async fn count_items(&self) -> anyhow::Result<i64> {
        self.count_query("SELECT COUNT(*) AS total FROM items", None)
            .await
    }

    /// Number of reports marked resolved.
    pub async fn count_resolved_items(&self) -> anyhow::Result<i64> {
        self.count_query(
            "SELECT COUNT(*) AS total FROM items WHERE is_resolved = 1",
            None,
        )
        .await
    }

    /// Total number of claims ever filed.
    pub async fn count_alerts(&self) -> anyhow::Result<i64> {
        self.count_query("SELECT COUNT(*) AS total FROM alerts", None)
            .await
    }

    /// Reports filed by one owner.
    pub async fn count_items_for_owner(&self, email: &str) -> anyhow::Result<i64> {
        self.count_query(
            "SELECT COUNT(*) AS total FROM items WHERE owner_email = ?",
            Some(email),
        )
        .await
    }

    /// Reports filed by one owner that were marked resolved.
    pub async fn count_recovered_items_for_owner(&self, email: &str) -> anyhow::Result<i64> {
        self.count_query(
            "SELECT COUNT(*) AS total FROM items WHERE owner_email = ? AND is_resolved = 1",
            Some(email),
        )
        .await
    }

    /// Claims filed by one finder.
    pub async fn count_alerts_for_finder(&self, email: &str) -> anyhow::Result<i64> {
        self.count_query(
            "SELECT COUNT(*) AS total FROM alerts WHERE finder_email = ?",
            Some(email),
        )
        .await
    }

    async fn count_query(&self, sql: &str, bind: Option<&str>) -> anyhow::Result<i64> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }

        let row = query.fetch_one(&self.pool).await?;
        Ok(row.get("total"))
    }
}

fn item_from_row(row: &SqliteRow) -> anyhow::Result<Item> {
    let report_type: String = row.get("report_type");
    let category: String = row.get("category");

    Ok(Item {
        id: row.get("id"),
        item_name: row.get("item_name"),
        report_type: ReportType::parse(&report_type)
            .ok_or_else(|| anyhow::anyhow!("unknown report type: {report_type}"))?,
        category: Category::parse(&category)
            .ok_or_else(|| anyhow::anyhow!("unknown category: {category}"))?,
        description: row.get("description"),
        date_lost: ts_to_datetime(row.get("date_lost")),
        last_seen_location: row.get("last_seen_location"),
        owner_email: row.get("owner_email"),
        image_url: row.get("image_url"),
        is_resolved: row.get::<i64, _>("is_resolved") != 0,
        notification_count: row.get("notification_count"),
        last_notified_at: row
            .get::<Option<i64>, _>("last_notified_at")
            .map(ts_to_datetime),
        created_at: ts_to_datetime(row.get("created_at")),
    })
}

fn alert_from_row(row: &SqliteRow) -> anyhow::Result<Alert> {
    let status: String = row.get("status");
    let delivery_status: String = row.get("delivery_status");

    Ok(Alert {
        id: row.get("id"),
        item_id: row.get("item_id"),
        finder_email: row.get("finder_email"),
        found_location: row.get("found_location"),
        mobile: row.get("mobile"),
        department: row.get("department"),
        message: row.get("message"),
        found_image_url: row.get("found_image_url"),
        status: AlertStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown alert status: {status}"))?,
        delivery_status: DeliveryStatus::parse(&delivery_status)
            .ok_or_else(|| anyhow::anyhow!("unknown delivery status: {delivery_status}"))?,
        transport_id: row.get("transport_id"),
        delivery_error: row.get("delivery_error"),
        retry_count: row.get("retry_count"),
        last_retry_at: row
            .get::<Option<i64>, _>("last_retry_at")
            .map(ts_to_datetime),
        created_at: ts_to_datetime(row.get("created_at")),
    })
}

fn user_from_row(row: &SqliteRow) -> anyhow::Result<User> {
    let badges_json: String = row.get("badges");

    Ok(User {
        email: row.get("email"),
        full_name: row.get("full_name"),
        reputation_points: row.get("reputation_points"),
        badges: serde_json::from_str(&badges_json)?,
        created_at: ts_to_datetime(row.get("created_at")),
    })
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}
