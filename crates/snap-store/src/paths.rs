use std::fmt;

use serde::{Deserialize, Serialize};

use snap_types::BuildId;

/// Which snapshot artifact of a build to address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Artifact {
    /// Guest memory image.
    #[default]
    Memfile,
    /// Root filesystem image.
    Rootfs,
}

impl Artifact {
    fn file_name(self) -> &'static str {
        match self {
            Self::Memfile => "memfile",
            Self::Rootfs => "rootfs.ext4",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memfile => write!(f, "memfile"),
            Self::Rootfs => write!(f, "rootfs"),
        }
    }
}

/// Object paths of one build's snapshot files, relative to the storage root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemplateFiles {
    pub build_id: BuildId,
}

impl TemplateFiles {
    pub fn new(build_id: BuildId) -> Self {
        Self { build_id }
    }

    /// Directory (or key prefix) holding every object of the build.
    pub fn storage_dir(&self) -> String {
        self.build_id.to_string()
    }

    pub fn data_path(&self, artifact: Artifact) -> String {
        format!("{}/{}", self.storage_dir(), artifact.file_name())
    }

    pub fn header_path(&self, artifact: Artifact) -> String {
        format!("{}/{}.header", self.storage_dir(), artifact.file_name())
    }
}
