use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const FINGERPRINT_AUTHOR_CHARS: usize = 50;
const FINGERPRINT_TEXT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub name: String,
    pub id: Option<String>,
    pub profile_url: Option<String>,
}

impl Author {
    pub const UNKNOWN_NAME: &'static str = "Unknown";

    pub fn unknown() -> Self {
        Self {
            name: Self::UNKNOWN_NAME.to_string(),
            id: None,
            profile_url: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name == Self::UNKNOWN_NAME
    }
}

impl Default for Author {
    fn default() -> Self {
        Self::unknown()
    }
}

/// A comment attached to an [`Item`]. Replies never nest further.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub author: Author,
    pub text: String,
    pub timestamp: String,
    pub images: Vec<String>,
}

/// One post harvested from the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    /// Set when the id was generated randomly because the node exposed nothing stable.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub low_confidence: bool,
    pub author: Author,
    pub text: String,
    pub timestamp: String,
    pub images: Vec<String>,
    pub reactions: u64,
    pub comments: Vec<Reply>,
    pub extraction_success: bool,
}

impl Item {
    /// Items with no text, no media and no replies are not worth emitting.
    pub fn has_content(&self) -> bool {
        !self.text.is_empty() || !self.images.is_empty() || !self.comments.is_empty()
    }

    /// Key used by the final duplicate sweep. Low-confidence ids are random, so
    /// those items fall back to a fingerprint over everything they carry.
    pub fn dedup_key(&self) -> String {
        if self.low_confidence {
            let mut body = self.text.clone();
            for image in &self.images {
                body.push('\n');
                body.push_str(image);
            }
            Self::fingerprint(&self.author.name, &body)
        } else {
            self.id.clone()
        }
    }

    /// Content fingerprint over truncated author name and body text.
    pub fn fingerprint(author: &str, text: &str) -> String {
        let author: String = author.trim().chars().take(FINGERPRINT_AUTHOR_CHARS).collect();
        let text: String = text.trim().chars().take(FINGERPRINT_TEXT_CHARS).collect();

        let mut hasher = Sha256::new();
        hasher.update(author.as_bytes());
        hasher.update(b"|");
        hasher.update(text.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("fp_{}", &digest[..16])
    }
}
