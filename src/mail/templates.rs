//! Email subjects and HTML bodies.
//!
//! Each builder returns a ready-to-send [`OutboundEmail`]. Bodies are plain
//! inline-styled HTML; recipients are campus mail accounts, so nothing
//! fancier than tables-and-divs survives anyway.

use crate::model::{Alert, Item};

use super::OutboundEmail;

/// Notify an item's owner that a finder has filed a claim.
///
/// Reply-to is set to the finder so the owner can answer directly; the
/// embedded claim link leads to the verification page where the owner
/// records the match/unmatch decision.
pub fn claim_notification(item: &Item, alert: &Alert, app_url: &str) -> OutboundEmail {
    let mailto = format!(
        "mailto:{}?subject={}",
        alert.finder_email,
        urlencoding::encode(&format!("Re: Found Item - {}", item.item_name))
    );

    let message_block = match alert.message.as_deref() {
        Some(message) if !message.is_empty() => format!(
            r#"<div style="background: #ffffff; padding: 15px; border-left: 4px solid #2563eb;">
              <div style="font-weight: bold; color: #4b5563;">Message from Finder</div>
              <div style="font-style: italic;">"{message}"</div>
            </div>"#
        ),
        _ => String::new(),
    };

    let html_body = format!(
        r#"<div style="font-family: sans-serif; max-width: 600px; margin: 0 auto;">
  <div style="background: #2563eb; color: white; padding: 30px 20px; text-align: center;">
    <h1 style="margin: 0;">Campus Lost &amp; Found</h1>
    <h2 style="margin: 10px 0 0; font-weight: normal;">Your Item Has Been Found!</h2>
  </div>
  <div style="padding: 30px; border: 1px solid #e5e7eb; border-top: none;">
    <p>Hello,</p>
    <p>Good news! Someone found your lost item on campus.</p>
    <div style="background: #f9fafb; padding: 20px; border: 1px solid #e5e7eb;">
      <div style="font-weight: bold; color: #4b5563;">Item Found</div>
      <div style="margin-bottom: 12px;">{item_name}</div>
      <div style="font-weight: bold; color: #4b5563;">Found Location</div>
      <div style="margin-bottom: 12px;">{found_location}</div>
      {message_block}
      <div style="font-weight: bold; color: #4b5563;">Finder's Contact Email</div>
      <div>{finder_email}</div>
    </div>
    <p><strong>Next Steps:</strong><br>
      1. Reply directly to the finder to arrange pickup.<br>
      2. Meet in a safe, public place on campus.<br>
      3. Verify the item is yours.</p>
    <div style="text-align: center; margin: 30px 0;">
      <a href="{mailto}" style="background: #10b981; color: white; padding: 14px 28px; text-decoration: none; font-weight: bold;">Reply to Finder</a>
      <div style="margin-top: 15px;">
        <p style="margin-bottom: 5px;">Or confirm via the platform:</p>
        <a href="{app_url}/claim/{alert_id}" style="color: #2563eb; font-weight: bold; text-decoration: none;">View Item &amp; Verify Claim</a>
      </div>
    </div>
    <div style="background: #fffbeb; padding: 15px; border: 1px solid #fcd34d;">
      <strong>Safety Tip:</strong> Meet in public, well-lit areas like the Student Center or Library. Bring a friend if possible.
    </div>
  </div>
  <div style="text-align: center; padding: 20px; color: #6b7280; font-size: 14px;">
    <p>This is an automated notification. Verify all claims personally.</p>
  </div>
</div>"#,
        item_name = item.item_name,
        found_location = alert.found_location,
        finder_email = alert.finder_email,
        alert_id = alert.id,
    );

    OutboundEmail {
        to: item.owner_email.clone(),
        subject: format!("Good News! Your \"{}\" has been found", item.item_name),
        html_body,
        reply_to: Some(alert.finder_email.clone()),
    }
}

/// Notify someone that the matching engine spotted a plausible counterpart.
///
/// `item_name` is the recipient's own report; `matched` is the counterpart
/// report whose details are shown.
pub fn match_notification(to: &str, item_name: &str, matched: &Item, app_url: &str) -> OutboundEmail {
    let html_body = format!(
        r#"<div style="font-family: sans-serif; max-width: 600px; margin: 0 auto;">
  <div style="background: #2563eb; padding: 20px; text-align: center; color: white;">
    <h1>Smart Match Alert</h1>
  </div>
  <div style="padding: 20px; border: 1px solid #e5e7eb; border-top: none;">
    <p>Hello,</p>
    <p>Good news! Our system detected a potential match for the <strong>"{item_name}"</strong> you reported.</p>
    <div style="background: #f3f4f6; padding: 15px; margin: 20px 0;">
      <h3 style="margin-top: 0;">Matched Item Details:</h3>
      <p><strong>Item:</strong> {matched_name}</p>
      <p><strong>Location:</strong> {matched_location}</p>
      <p><strong>Date:</strong> {matched_date}</p>
      <p><strong>Description:</strong> {matched_description}</p>
    </div>
    <div style="text-align: center; margin: 30px 0;">
      <a href="{app_url}/dashboard" style="background: #2563eb; color: white; padding: 12px 24px; text-decoration: none; font-weight: bold;">View Match on Dashboard</a>
    </div>
    <p style="font-size: 12px; color: #6b7280; text-align: center;">
      Please verify the details carefully. Do not share sensitive personal info until you are sure.
    </p>
  </div>
</div>"#,
        matched_name = matched.item_name,
        matched_location = matched.last_seen_location,
        matched_date = matched.date_lost.format("%Y-%m-%d"),
        matched_description = matched.description,
    );

    OutboundEmail {
        to: to.to_string(),
        subject: format!("Potential Match: We found a similar item to your \"{item_name}\"!"),
        html_body,
        reply_to: None,
    }
}

/// Tell the finder the owner confirmed the match, with meeting instructions.
pub fn owner_confirmation(to: &str, item_name: &str, meeting_details: &str) -> OutboundEmail {
    let html_body = format!(
        r#"<div style="font-family: sans-serif; max-width: 600px; margin: 0 auto;">
  <h1 style="color: #16a34a;">It's a Match!</h1>
  <p>The owner of the <strong>{item_name}</strong> has confirmed it is theirs.</p>
  <div style="background: #f0fdf4; padding: 20px; margin: 20px 0; border: 1px solid #bbf7d0;">
    <h3 style="margin-top: 0; color: #15803d;">Meeting Instructions from Owner</h3>
    <p style="font-size: 16px; color: #374151;">"{meeting_details}"</p>
  </div>
  <p>Please meet them at the specified location to return the item.</p>
  <p>Thank you for helping keep our campus honest!</p>
</div>"#
    );

    OutboundEmail {
        to: to.to_string(),
        subject: format!("Update: The owner confirmed your find! ({item_name})"),
        html_body,
        reply_to: None,
    }
}

/// Tell the finder the owner determined it is not their item.
pub fn rejection(to: &str, item_name: &str) -> OutboundEmail {
    let html_body = r#"<div style="font-family: sans-serif; padding: 20px;">
  <h2>Match Update</h2>
  <p>The owner has reviewed the details you provided.</p>
  <p>Unfortunately, they have indicated that <strong>this is not their item</strong>.</p>
  <p>Thank you for your honesty and effort in trying to return it!</p>
</div>"#
        .to_string();

    OutboundEmail {
        to: to.to_string(),
        subject: format!("Update: Not a match for \"{item_name}\""),
        html_body,
        reply_to: None,
    }
}

/// Probe message for verifying the configured transport.
pub fn probe(to: &str) -> OutboundEmail {
    OutboundEmail {
        to: to.to_string(),
        subject: "Test Email from Campus Lost & Found".to_string(),
        html_body: "<h1>It works!</h1><p>Your outbound mail transport is correctly configured.</p>"
            .to_string(),
        reply_to: None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::model::{AlertStatus, Category, DeliveryStatus, ReportType};

    use super::*;

    fn sample_item() -> Item {
        Item {
            id: 7,
            item_name: "Blue Hydroflask".to_string(),
            report_type: ReportType::Lost,
            category: Category::Accessories,
            description: "Dented at the base".to_string(),
            date_lost: Utc::now(),
            last_seen_location: "Library".to_string(),
            owner_email: "alice@uni.edu".to_string(),
            image_url: None,
            is_resolved: false,
            notification_count: 0,
            last_notified_at: None,
            created_at: Utc::now(),
        }
    }

    fn sample_alert() -> Alert {
        Alert {
            id: 42,
            item_id: 7,
            finder_email: "bob@uni.edu".to_string(),
            found_location: "Cafeteria".to_string(),
            mobile: None,
            department: None,
            message: Some("Found it under a table".to_string()),
            found_image_url: None,
            status: AlertStatus::Pending,
            delivery_status: DeliveryStatus::Pending,
            transport_id: None,
            delivery_error: None,
            retry_count: 0,
            last_retry_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_claim_notification_addresses_owner() {
        let email = claim_notification(&sample_item(), &sample_alert(), "http://localhost:3000");

        assert_eq!(email.to, "alice@uni.edu");
        assert_eq!(email.reply_to.as_deref(), Some("bob@uni.edu"));
        assert!(email.subject.contains("Blue Hydroflask"));
        assert!(email.html_body.contains("/claim/42"));
        assert!(email.html_body.contains("Found it under a table"));
        // The mailto subject is percent-encoded
        assert!(email.html_body.contains("Re%3A%20Found%20Item"));
    }

    #[test]
    fn test_claim_notification_without_message() {
        let mut alert = sample_alert();
        alert.message = None;

        let email = claim_notification(&sample_item(), &alert, "http://localhost:3000");

        assert!(!email.html_body.contains("Message from Finder"));
    }

    #[test]
    fn test_match_notification_names_own_report() {
        let email = match_notification(
            "alice@uni.edu",
            "Blue Hydroflask",
            &sample_item(),
            "http://localhost:3000",
        );

        assert_eq!(email.to, "alice@uni.edu");
        assert!(email.subject.contains("Blue Hydroflask"));
        assert!(email.reply_to.is_none());
    }

    #[test]
    fn test_rejection_subject() {
        let email = rejection("bob@uni.edu", "Found Item");

        assert!(email.subject.contains("Not a match"));
        assert!(email.subject.contains("Found Item"));
    }
}
