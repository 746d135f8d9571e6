use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use colored::{ColoredString, Colorize};
use serde::Serialize;
use uuid::Uuid;

use calgrid_core::models::{ColorBucket, Message};

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Resolve a message reference: a 1-based position from `message list`, or a UUID.
pub(crate) fn resolve_message(messages: &[Message], reference: &str) -> Result<Uuid> {
    if let Ok(n) = reference.parse::<usize>() {
        if n < 1 || n > messages.len() {
            bail!(
                "No message #{n}. There are {} messages",
                messages.len()
            );
        }
        return Ok(messages[n - 1].id);
    }
    Uuid::parse_str(reference)
        .with_context(|| format!("Invalid message reference '{reference}'. Use a number or an id"))
}

/// Colour a label the way the calendar shows its bucket.
pub(crate) fn paint(text: &str, bucket: ColorBucket) -> ColoredString {
    match bucket {
        ColorBucket::Neutral => text.black().on_bright_black(),
        ColorBucket::Good => text.black().on_green(),
        ColorBucket::Mild => text.black().on_yellow(),
        ColorBucket::Moderate => text.black().on_truecolor(255, 165, 0),
        ColorBucket::Severe => text.white().on_red(),
        ColorBucket::Extreme => text.white().on_black(),
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
