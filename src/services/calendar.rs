use chrono::Duration;

use crate::models::{Booking, BookingStatus, Space};

fn escape_text(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

pub fn generate_ics(booking: &Booking, space: &Space) -> String {
    let (dtstart, dtend) = match booking.window().time_range() {
        Some(_) => (
            format!("DTSTART:{}", booking.starts_at().format("%Y%m%dT%H%M%S")),
            format!("DTEND:{}", booking.ends_at().format("%Y%m%dT%H%M%S")),
        ),
        // All-day events use an exclusive end date.
        None => (
            format!("DTSTART;VALUE=DATE:{}", booking.start_date.format("%Y%m%d")),
            format!(
                "DTEND;VALUE=DATE:{}",
                (booking.end_date + Duration::days(1)).format("%Y%m%d")
            ),
        ),
    };
    let dtstamp = booking.created_at.format("%Y%m%dT%H%M%S").to_string();
    let uid = format!("{}@spacebook", booking.id);

    let summary = escape_text(&format!("Booking: {}", space.name));
    let description = escape_text(&format!(
        "{} people, {} {}{}",
        booking.people_count,
        booking.total_price,
        space.currency,
        booking
            .notes
            .as_deref()
            .map(|n| format!("\n{n}"))
            .unwrap_or_default()
    ));
    let status = match booking.status {
        BookingStatus::Cancelled => "CANCELLED",
        BookingStatus::Pending => "TENTATIVE",
        _ => "CONFIRMED",
    };

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Spacebook//Bookings//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         {dtstart}\r\n\
         {dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         STATUS:{status}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}
