//! Notification messages sent when a reservation is made.

use super::MailData;
use crate::config::MailConfig;
use crate::db::NewReservation;

/// Template wrapped around the guest confirmation
pub const CONFIRMATION_TEMPLATE: &str = "basic.html";

/// Confirmation sent to the guest
pub fn reservation_confirmation(config: &MailConfig, reservation: &NewReservation) -> MailData {
    let content = format!(
        r#"<strong>Thank you for making a reservation</strong><br />
<p>Dear {},</p>
<p>This is to confirm your reservation from {} to {}.</p>
<p>We hope to see you soon.</p>"#,
        html_escape(&reservation.guest.first_name),
        reservation.start_date.format("%Y-%m-%d"),
        reservation.end_date.format("%Y-%m-%d"),
    );

    MailData {
        to: reservation.guest.email.clone(),
        from: config.from_address.clone(),
        subject: "Reservation Confirmation".to_string(),
        content,
        template: Some(CONFIRMATION_TEMPLATE.to_string()),
    }
}

/// Alert sent to the operations mailbox
pub fn new_reservation_alert(
    config: &MailConfig,
    reservation: &NewReservation,
    room_name: &str,
) -> MailData {
    let guest = &reservation.guest;
    let content = format!(
        r#"<strong>New reservation</strong><br />
<p>Guest: {} {}</p>
<p>Dates: {} to {}</p>
<p>Room: {}</p>
<p>Email: {}</p>
<p>Phone: {}</p>"#,
        html_escape(&guest.first_name),
        html_escape(&guest.last_name),
        reservation.start_date.format("%Y-%m-%d"),
        reservation.end_date.format("%Y-%m-%d"),
        html_escape(room_name),
        html_escape(&guest.email),
        html_escape(&guest.phone),
    );

    MailData {
        to: config.operations_address.clone(),
        from: config.from_address.clone(),
        subject: "New Reservation".to_string(),
        content,
        template: None,
    }
}

/// Guest input goes into HTML mail bodies
fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
