//! Artifact model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use papermill_core::events::DownloadDescriptor;

use crate::area::StorageArea;

/// A physical file tracked by the artifact store.
///
/// Created by staging an upload or by a handler sealing an output slot;
/// destroyed by the retention sweeper once its age exceeds the threshold.
/// There is no delete-on-download: artifacts persist until swept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// File name, also the user-visible display name.
    pub name: String,
    /// Area the file lives in.
    pub area: StorageArea,
    /// Path relative to the area root; one segment for flat outputs, two
    /// (`batch_dir/name`) for batch members.
    pub relative_path: String,
    /// Absolute path on disk. Process-local, never serialized.
    #[serde(skip)]
    pub path: PathBuf,
    /// Final byte size recorded when the artifact was sealed.
    pub size_bytes: u64,
    /// When the artifact was sealed.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Externally addressable download reference. Only meaningful for
    /// Output artifacts; other areas are never served.
    pub fn download_url(&self) -> String {
        format!("/download/{}", self.relative_path)
    }

    /// Build the download descriptor carried on a terminal success event.
    pub fn to_descriptor(&self, type_label: impl Into<String>) -> DownloadDescriptor {
        DownloadDescriptor {
            name: self.name.clone(),
            url: self.download_url(),
            type_label: type_label.into(),
            filename: self.name.clone(),
        }
    }
}

/// Format a byte count the way users read it, with one decimal above bytes.
pub fn format_file_size(size_bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    let size = size_bytes as f64;
    if size < KB {
        format!("{size_bytes} B")
    } else if size < MB {
        format!("{:.1} KB", size / KB)
    } else if size < GB {
        format!("{:.1} MB", size / MB)
    } else {
        format!("{:.1} GB", size / GB)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(relative_path: &str) -> Artifact {
        Artifact {
            name: relative_path.rsplit('/').next().unwrap_or_default().to_string(),
            area: StorageArea::Output,
            relative_path: relative_path.to_string(),
            path: PathBuf::new(),
            size_bytes: 1024,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_download_url_flat_and_nested() {
        assert_eq!(
            artifact("report_merged_1a2b3c4d.pdf").download_url(),
            "/download/report_merged_1a2b3c4d.pdf"
        );
        assert_eq!(
            artifact("report_split_1a2b3c4d/report_page_1.pdf").download_url(),
            "/download/report_split_1a2b3c4d/report_page_1.pdf"
        );
    }

    #[test]
    fn test_descriptor_carries_label() {
        let descriptor = artifact("report_merged_1a2b3c4d.pdf").to_descriptor("Merged PDF");
        assert_eq!(descriptor.type_label, "Merged PDF");
        assert_eq!(descriptor.name, "report_merged_1a2b3c4d.pdf");
        assert_eq!(descriptor.filename, descriptor.name);
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024 + 300 * 1024), "5.3 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
