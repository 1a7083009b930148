use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::domain::GroupInfo;
use crate::extract::{element_text, parse_count};

static HEADING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static MEMBERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,.]*\s*[KkMm]?)\s+members?\b").unwrap()
});
static TITLE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[|–-]\s+[^|–]+$").unwrap());

/// Group id from a `/groups/<id>` path segment.
pub fn group_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let mut segments = parsed.path_segments()?;
    segments.find(|s| *s == "groups")?;
    segments
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Name, id and member count of the group shown in `snapshot`.
pub fn group_info(snapshot: &str, url: &str) -> GroupInfo {
    let doc = Html::parse_document(snapshot);
    let mut info = GroupInfo::unknown(url);
    info.id = group_id_from_url(url);

    let heading = doc
        .select(&HEADING)
        .map(|h| element_text(&h))
        .find(|text| !text.is_empty());
    let title = || {
        doc.select(&TITLE)
            .map(|t| element_text(&t))
            .map(|text| TITLE_SUFFIX.replace(&text, "").trim().to_string())
            .find(|text| !text.is_empty())
    };
    if let Some(name) = heading.or_else(title) {
        info.name = name;
    }

    let body_text = element_text(&doc.root_element());
    info.member_count = MEMBERS
        .captures(&body_text)
        .and_then(|caps| parse_count(&caps[1]));
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_info_from_heading() {
        let html = r#"<html><head><title>Bike Swap | Facebook</title></head>
            <body><h1>Bike Swap Berlin</h1><span>1,234 members</span></body></html>"#;
        let info = group_info(html, "https://www.facebook.com/groups/424242/");
        assert_eq!(info.name, "Bike Swap Berlin");
        assert_eq!(info.id.as_deref(), Some("424242"));
        assert_eq!(info.member_count, Some(1234));
    }

    #[test]
    fn test_group_name_falls_back_to_title() {
        let html = r#"<html><head><title>Bike Swap | Facebook</title></head>
            <body><span>12.5K members</span></body></html>"#;
        let info = group_info(html, "https://www.facebook.com/groups/bikeswap");
        assert_eq!(info.name, "Bike Swap");
        assert_eq!(info.id.as_deref(), Some("bikeswap"));
        assert_eq!(info.member_count, Some(12500));
    }

    #[test]
    fn test_unknown_group() {
        let info = group_info("<html><body><p>nothing</p></body></html>", "about:blank");
        assert_eq!(info.name, GroupInfo::UNKNOWN_NAME);
        assert_eq!(info.id, None);
        assert_eq!(info.member_count, None);
    }

    #[test]
    fn test_group_id_requires_groups_segment() {
        assert_eq!(group_id_from_url("https://example.com/pages/55"), None);
        assert_eq!(group_id_from_url("https://example.com/groups/"), None);
        assert_eq!(
            group_id_from_url("https://example.com/groups/55/posts/1"),
            Some("55".into())
        );
    }
}
