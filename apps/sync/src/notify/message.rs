use chrono::{DateTime, Utc};

use crate::models::sync_history::SyncHistory;

#[derive(Debug, Clone)]
pub struct AlertMessage {
    pub subject: String,
    pub text: String,
    pub html: String,
}

const TROUBLESHOOTING: [&str; 4] = [
    "Check that the Airtable API key is still valid",
    "Confirm the Airtable base id and table",
    "Check database connectivity",
    "Inspect recent runs with GET /api/v1/sync/history",
];

/// Renders the failure alert. `failures` must be most recent first.
pub fn build_alert_message(failures: &[SyncHistory], now: DateTime<Utc>) -> AlertMessage {
    let count = failures.len();
    let latest_error = failures
        .first()
        .and_then(|f| f.error_message.as_deref())
        .unwrap_or("unknown error");

    let details = failures
        .iter()
        .enumerate()
        .map(|(i, f)| {
            format!(
                "{}. {}\n   error: {}\n   records checked: {}\n   records failed: {}",
                i + 1,
                f.sync_time.format("%Y-%m-%d %H:%M:%S UTC"),
                f.error_message.as_deref().unwrap_or("unknown error"),
                f.records_checked,
                f.records_failed
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let steps_text = TROUBLESHOOTING
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {s}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    let steps_html: String = TROUBLESHOOTING
        .iter()
        .map(|s| format!("<li>{}</li>", escape_html(s)))
        .collect();

    let sent_at = now.format("%Y-%m-%d %H:%M:%S UTC");

    let text = format!(
        "Airtable sync failure alert\n\n\
         {count} consecutive sync runs have failed.\n\n\
         Failures (most recent first):\n{details}\n\n\
         Latest error:\n{latest_error}\n\n\
         Suggested steps:\n{steps_text}\n\n\
         Sent at {sent_at}\n"
    );

    let html = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"UTF-8\"></head><body>\
         <h1>Airtable sync failure alert</h1>\
         <p><strong>{count} consecutive sync runs have failed.</strong></p>\
         <h2>Failures</h2><pre>{}</pre>\
         <h2>Latest error</h2><p><code>{}</code></p>\
         <h2>Suggested steps</h2><ol>{steps_html}</ol>\
         <p>Sent at {sent_at}</p></body></html>",
        escape_html(&details),
        escape_html(latest_error),
    );

    AlertMessage {
        subject: format!("Airtable sync failure alert: {count} consecutive failures"),
        text,
        html,
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
