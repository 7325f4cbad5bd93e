//! Storage area enumeration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle stage a stored file belongs to.
///
/// Every artifact lives in exactly one area. Scratch content is always
/// removable without user impact; Output content must survive the full
/// retention window even if never downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    /// Freshly uploaded inputs awaiting their job.
    Intake,
    /// Produced artifacts, user-downloadable.
    Output,
    /// Intermediate files, never user-facing.
    Scratch,
}

impl StorageArea {
    /// All areas, in sweep order.
    pub const ALL: [StorageArea; 3] = [Self::Intake, Self::Output, Self::Scratch];

    /// Directory name of the area under the storage root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Output => "output",
            Self::Scratch => "scratch",
        }
    }

    /// Whether files in this area are served to users.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::Output)
    }
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
