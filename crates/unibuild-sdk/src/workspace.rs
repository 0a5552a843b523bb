//! Build prefix layout and success marker.
//!
//! A prefix is the disposable scratch and output directory for one
//! (library, platform) pair:
//!
//! ```text
//! <library>/build-<platform>~/
//! ├── <arch>/            # install root for each architecture
//! ├── toolchains/<arch>/ # android standalone toolchains
//! └── out/
//!     ├── include/
//!     ├── lib/[<abi>/]
//!     └── .success
//! ```
//!
//! Deleting the whole prefix is always safe; the next build recreates it.

use std::fs;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::types::{BuildError, Library, Platform};

/// File name of the success marker inside `out/`.
pub const SUCCESS_MARKER: &str = ".success";

/// Paths inside one build prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prefix {
    root: PathBuf,
}

impl Prefix {
    /// Prefix for `library` built for `platform`.
    pub fn for_library(library: &Library, platform: Platform) -> Self {
        Self::at(library.path.join(format!("build-{}~", platform)))
    }

    /// Prefix rooted at an explicit directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The prefix directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Install root for `arch`; passed to configure as `--prefix`.
    pub fn arch_dir(&self, arch: &str) -> PathBuf {
        self.root.join(arch)
    }

    /// Standalone toolchain directory for `arch`.
    pub fn toolchain_dir(&self, arch: &str) -> PathBuf {
        self.root.join("toolchains").join(arch)
    }

    /// Merged output directory.
    pub fn out_dir(&self) -> PathBuf {
        self.root.join("out")
    }

    /// Merged headers.
    pub fn out_include(&self) -> PathBuf {
        self.out_dir().join("include")
    }

    /// Merged libraries.
    pub fn out_lib(&self) -> PathBuf {
        self.out_dir().join("lib")
    }

    /// Path of the success marker.
    pub fn success_marker(&self) -> PathBuf {
        self.out_dir().join(SUCCESS_MARKER)
    }

    /// Whether a previous build completed and was merged.
    pub fn is_built(&self) -> bool {
        self.success_marker().is_file()
    }

    /// Creates the prefix directory if it does not exist.
    pub fn create(&self) -> Result<(), BuildError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            BuildError::Environment(format!(
                "Failed to create build prefix {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    /// Removes the prefix and everything in it. Missing prefixes are fine.
    pub fn destroy(&self) -> Result<(), BuildError> {
        if !self.root.exists() {
            return Ok(());
        }
        debug!(prefix = %self.root.display(), "removing build prefix");
        fs::remove_dir_all(&self.root).map_err(|e| {
            BuildError::Clean(format!(
                "Failed to remove build prefix {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    /// Removes and recreates the prefix.
    pub fn recreate(&self) -> Result<(), BuildError> {
        self.destroy()?;
        self.create()
    }

    /// Writes the success marker. Call only after every merge step succeeded.
    pub fn mark_success(&self, record: &SuccessRecord) -> Result<(), BuildError> {
        fs::create_dir_all(self.out_dir())?;
        let json = serde_json::to_string_pretty(record)?;
        fs::write(self.success_marker(), json).map_err(|e| {
            BuildError::Merge(format!(
                "Failed to write success marker {}: {}",
                self.success_marker().display(),
                e
            ))
        })
    }

    /// Reads the record stored in the success marker, if it exists and parses.
    pub fn success_record(&self) -> Option<SuccessRecord> {
        let contents = fs::read_to_string(self.success_marker()).ok()?;
        serde_json::from_str(&contents).ok()
    }
}

/// What produced a merged bundle; stored in the success marker.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SuccessRecord {
    /// Library name.
    pub library: String,
    /// Platform the bundle targets.
    pub platform: Platform,
    /// Architectures merged into the bundle, in build order.
    pub archs: Vec<String>,
    /// Completion time in RFC 3339 format.
    pub completed_at: String,
}

impl SuccessRecord {
    /// Creates a record stamped with the current UTC time.
    pub fn now(library: &str, platform: Platform, archs: &[String]) -> Self {
        let now = OffsetDateTime::now_utc();
        let completed_at = now
            .format(&Rfc3339)
            .unwrap_or_else(|_| now.unix_timestamp().to_string());
        Self {
            library: library.to_string(),
            platform,
            archs: archs.to_vec(),
            completed_at,
        }
    }
}
