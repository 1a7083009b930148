//! JSON export of harvest reports.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app::Result;
use crate::domain::HarvestReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory for exported files; the data dir's `exports/` when unset
    pub output_dir: Option<PathBuf>,

    /// Reports larger than this are split across several files (default: 2000)
    pub max_items_per_file: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            max_items_per_file: 2000,
        }
    }
}

impl ExportConfig {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_export_dir)
    }
}

pub fn default_export_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("gleaner").join("exports"))
        .unwrap_or_else(|| PathBuf::from("exports"))
}

pub struct Exporter {
    dir: PathBuf,
    max_items_per_file: usize,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>, max_items_per_file: usize) -> Self {
        Self {
            dir: dir.into(),
            max_items_per_file: max_items_per_file.max(1),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.output_dir(), config.max_items_per_file)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<group>_posts_<date>[_partial]`, without extension.
    pub fn base_name(report: &HarvestReport) -> String {
        let mut name = format!(
            "{}_posts_{}",
            report.group_info.slug(),
            report.collected_at.format("%Y-%m-%d")
        );
        if report.partial_data {
            name.push_str("_partial");
        }
        name
    }

    /// Write the report, split into parts when it is too large. Returns the
    /// written paths in order.
    pub fn write(&self, report: &HarvestReport) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)?;
        let base = Self::base_name(report);

        if report.items.len() <= self.max_items_per_file {
            let path = self.dir.join(format!("{}.json", base));
            write_json(&path, report)?;
            info!("Exported {} items to {}", report.items.len(), path.display());
            return Ok(vec![path]);
        }

        let mut paths = Vec::new();
        for (i, chunk) in report.items.chunks(self.max_items_per_file).enumerate() {
            let path = self.dir.join(format!("{}_part{}.json", base, i + 1));
            write_json(&path, &report.with_items(chunk.to_vec()))?;
            paths.push(path);
        }
        info!(
            "Exported {} items across {} files in {}",
            report.items.len(),
            paths.len(),
            self.dir.display()
        );
        Ok(paths)
    }
}

fn write_json(path: &Path, report: &HarvestReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Author, GroupInfo, Item};
    use chrono::{TimeZone, Utc};

    fn report(count: usize, partial: bool) -> HarvestReport {
        let items = (0..count)
            .map(|i| Item {
                id: format!("{}", i),
                low_confidence: false,
                author: Author::unknown(),
                text: format!("post {}", i),
                timestamp: "2024-01-01T00:00:00Z".into(),
                images: Vec::new(),
                reactions: 0,
                comments: Vec::new(),
                extraction_success: true,
            })
            .collect();
        let mut group = GroupInfo::unknown("https://www.facebook.com/groups/424242");
        group.id = Some("424242".into());
        let mut report = if partial {
            HarvestReport::partial(group, items)
        } else {
            HarvestReport::complete(group, items)
        };
        report.collected_at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        report
    }

    #[test]
    fn test_file_name() {
        assert_eq!(Exporter::base_name(&report(1, false)), "424242_posts_2024-03-09");
        assert_eq!(
            Exporter::base_name(&report(1, true)),
            "424242_posts_2024-03-09_partial"
        );
    }

    #[test]
    fn test_write_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path(), 100);

        let paths = exporter.write(&report(3, false)).unwrap();
        assert_eq!(paths.len(), 1);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(json["totalCollected"], 3);
        assert_eq!(json["isComplete"], true);
        assert_eq!(json["posts"].as_array().unwrap().len(), 3);
        assert_eq!(json["groupInfo"]["id"], "424242");
    }

    #[test]
    fn test_large_report_is_split() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Exporter::new(dir.path().join("nested"), 4);

        let paths = exporter.write(&report(10, true)).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "424242_posts_2024-03-09_partial_part1.json",
                "424242_posts_2024-03-09_partial_part2.json",
                "424242_posts_2024-03-09_partial_part3.json",
            ]
        );

        let last: HarvestReport =
            serde_json::from_str(&fs::read_to_string(&paths[2]).unwrap()).unwrap();
        assert_eq!(last.total_collected, 2);
        assert!(last.partial_data);
    }
}
