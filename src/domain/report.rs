use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{GroupInfo, Item};

/// The JSON document handed to storage and export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestReport {
    pub group_info: GroupInfo,
    #[serde(rename = "posts")]
    pub items: Vec<Item>,
    pub total_collected: usize,
    pub is_complete: bool,
    #[serde(default)]
    pub partial_data: bool,
    pub collected_at: DateTime<Utc>,
}

impl HarvestReport {
    pub fn complete(group_info: GroupInfo, items: Vec<Item>) -> Self {
        Self {
            group_info,
            total_collected: items.len(),
            items,
            is_complete: true,
            partial_data: false,
            collected_at: Utc::now(),
        }
    }

    pub fn partial(group_info: GroupInfo, items: Vec<Item>) -> Self {
        Self {
            group_info,
            total_collected: items.len(),
            items,
            is_complete: false,
            partial_data: true,
            collected_at: Utc::now(),
        }
    }

    /// Copy of this report carrying only `items`.
    pub fn with_items(&self, items: Vec<Item>) -> Self {
        Self {
            group_info: self.group_info.clone(),
            total_collected: items.len(),
            items,
            is_complete: self.is_complete,
            partial_data: self.partial_data,
            collected_at: self.collected_at,
        }
    }
}
