use serde::{Deserialize, Serialize};

/// Tuning for the field extractors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Text fragments shorter than this (in chars) are ignored (default: 3)
    pub min_text_len: usize,

    /// Dice similarity above which a shorter fragment counts as a duplicate (default: 0.85)
    pub similarity_threshold: f64,

    /// UI affordance strings never treated as body text (case-insensitive, exact)
    pub exclusion_phrases: Vec<String>,

    /// Media locators containing any of these are icons, not content
    pub icon_substrings: Vec<String>,

    /// Collect comments under each post (default: true)
    pub include_replies: bool,

    /// Mine embedded JSON script payloads for extra text (default: false)
    pub mine_script_payloads: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_text_len: 3,
            similarity_threshold: 0.85,
            exclusion_phrases: [
                "Like",
                "Comment",
                "Share",
                "Reply",
                "Send",
                "Follow",
                "See more",
                "See less",
                "Show more",
                "See translation",
                "See original",
                "Rate this translation",
                "Write a comment…",
                "Write a comment...",
                "Write a public comment…",
                "View more comments",
                "View previous comments",
                "Most relevant",
                "All reactions:",
                "Edited",
                "Just now",
                "Yesterday",
                "Admin",
                "Moderator",
                "Top contributor",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            icon_substrings: [
                "emoji",
                "rsrc.php",
                "reaction",
                "static.xx.fbcdn.net",
                "/p32x32/",
                "/p36x36/",
                "/p40x40/",
                "/s32x32/",
                "/s40x40/",
                "profile_pic",
                "data:",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            include_replies: true,
            mine_script_payloads: false,
        }
    }
}
