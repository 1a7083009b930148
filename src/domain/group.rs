use serde::{Deserialize, Serialize};

/// Metadata about the feed container being harvested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub name: String,
    pub id: Option<String>,
    pub member_count: Option<u64>,
    pub url: String,
}

impl GroupInfo {
    pub const UNKNOWN_NAME: &'static str = "Unknown Group";

    pub fn unknown(url: impl Into<String>) -> Self {
        Self {
            name: Self::UNKNOWN_NAME.to_string(),
            id: None,
            member_count: None,
            url: url.into(),
        }
    }

    /// Stable token used in export filenames.
    pub fn slug(&self) -> String {
        if let Some(id) = &self.id {
            return id.clone();
        }
        let slug: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let slug = slug.trim_matches('_').to_string();
        if slug.is_empty() {
            "group".to_string()
        } else {
            slug
        }
    }
}
