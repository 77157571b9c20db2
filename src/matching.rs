//! Heuristic correlation between lost and found reports.
//!
//! When a new report is filed, [`correlate`] scans the store for unresolved
//! counterpart reports in the same category that share a keyword (or a
//! location substring) and dispatches one "potential match" email per
//! candidate. It is a best-effort enhancement of report creation, never a
//! required step: it writes nothing, and every failure is logged instead of
//! propagated to the creation flow.
//!
//! The notification direction is asymmetric:
//!
//! - a new **found** report notifies the owner of each matched lost report
//!   (they are the ones looking for their item)
//! - a new **lost** report notifies the reporter who just posted, once per
//!   matched found report (immediate feedback; up to three separate emails)

use tracing::{info, warn};

use crate::mail::{Mailer, templates};
use crate::model::{Item, ReportType};
use crate::storage::Storage;

/// At most this many candidates are considered per correlation pass.
const MAX_CANDIDATES: i64 = 3;

/// Tokens must be longer than this to count as keywords. Short/common words
/// are excluded to reduce false positives.
const MIN_KEYWORD_CHARS: usize = 3;

/// Extract matching keywords from an item name.
pub fn keywords(item_name: &str) -> Vec<String> {
    item_name
        .split_whitespace()
        .filter(|word| word.len() > MIN_KEYWORD_CHARS)
        .map(|word| word.to_string())
        .collect()
}

/// Find plausible counterparts for a newly filed report and dispatch one
/// "potential match" email per candidate.
///
/// Returns the candidate list (at most three; store-defined order, no
/// ranking beyond the filter). A store failure yields an empty
/// list; a transport failure aborts the remaining dispatches of this pass.
/// Neither affects the newly created item.
pub async fn correlate(
    storage: &Storage,
    mailer: &dyn Mailer,
    app_url: &str,
    new_item: &Item,
) -> Vec<Item> {
    // Matching needs a name to tokenize; a blank one makes this a no-op,
    // not an error.
    if new_item.item_name.trim().is_empty() {
        return Vec::new();
    }

    let target_type = new_item.report_type.counterpart();
    let words = keywords(&new_item.item_name);

    let candidates = match storage
        .find_match_candidates(
            target_type,
            new_item.category,
            &words,
            &new_item.last_seen_location,
            MAX_CANDIDATES,
        )
        .await
    {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(
                item_id = new_item.id,
                error = %e,
                "Match scan failed"
            );
            return Vec::new();
        }
    };

    info!(
        item_id = new_item.id,
        item_name = %new_item.item_name,
        candidates = candidates.len(),
        "Match scan complete"
    );

    for candidate in &candidates {
        let email = match new_item.report_type {
            // The new report is FOUND: the matched lost report's owner is
            // the one who wants to hear about it.
            ReportType::Found => templates::match_notification(
                &candidate.owner_email,
                &candidate.item_name,
                new_item,
                app_url,
            ),
            // The new report is LOST: tell the reporter about each existing
            // found report, one email per candidate.
            ReportType::Lost => templates::match_notification(
                &new_item.owner_email,
                &new_item.item_name,
                candidate,
                app_url,
            ),
        };

        let outcome = mailer.send(&email).await;
        if !outcome.success {
            warn!(
                item_id = new_item.id,
                candidate_id = candidate.id,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "Match notification failed; aborting remaining dispatches"
            );
            break;
        }

        info!(
            item_id = new_item.id,
            candidate_id = candidate.id,
            to = %email.to,
            "Match notification sent"
        );
    }

    candidates
}
