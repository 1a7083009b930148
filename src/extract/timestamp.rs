use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use scraper::{ElementRef, Selector};

use crate::extract::{in_nested_reply, Extraction, ExtractionOutcome};

static UTIME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[data-utime]").unwrap());
static TIME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("time[datetime]").unwrap());
static TIMESTAMP_ATTR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-timestamp]").unwrap());

pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Machine-readable timestamp inside `root`, as ISO-8601.
pub(crate) fn extract_timestamp(root: &ElementRef<'_>) -> Extraction<String> {
    let mut malformed = None;

    for node in root.select(&UTIME) {
        if in_nested_reply(&node, root) {
            continue;
        }
        if let Some(raw) = node.value().attr("data-utime") {
            match parse_epoch(raw) {
                Some(ts) => return Ok(ts),
                None => malformed = Some(raw.to_string()),
            }
        }
    }

    for node in root.select(&TIME) {
        if in_nested_reply(&node, root) {
            continue;
        }
        if let Some(raw) = node.value().attr("datetime") {
            match DateTime::parse_from_rfc3339(raw.trim()) {
                Ok(dt) => {
                    return Ok(dt
                        .with_timezone(&Utc)
                        .to_rfc3339_opts(SecondsFormat::Secs, true))
                }
                Err(_) => malformed = Some(raw.to_string()),
            }
        }
    }

    for node in root.select(&TIMESTAMP_ATTR) {
        if in_nested_reply(&node, root) {
            continue;
        }
        if let Some(raw) = node.value().attr("data-timestamp") {
            match parse_epoch(raw) {
                Some(ts) => return Ok(ts),
                None => malformed = Some(raw.to_string()),
            }
        }
    }

    match malformed {
        Some(raw) => Err(ExtractionOutcome::Malformed(format!("unparseable time {:?}", raw))),
        None => Err(ExtractionOutcome::NotFound),
    }
}

/// Unix epoch in seconds, or milliseconds when the value is too large for seconds.
fn parse_epoch(raw: &str) -> Option<String> {
    let value: i64 = raw.trim().parse().ok()?;
    let dt = if value > 100_000_000_000 {
        Utc.timestamp_millis_opt(value).single()?
    } else {
        Utc.timestamp_opt(value, 0).single()?
    };
    Some(dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}
