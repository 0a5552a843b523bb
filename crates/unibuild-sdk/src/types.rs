//! Core types for unibuild-sdk.
//!
//! This module defines the fundamental types used throughout the engine:
//!
//! - [`BuildError`] - Error taxonomy for every lifecycle step
//! - [`Platform`] / [`PlatformSelection`] - Target platform identity
//! - [`MergeLayout`] - How per-architecture products are combined
//! - [`Library`] - The source tree being built
//! - [`BuildRequest`] / [`Outcome`] - Orchestrator input and result

use std::fmt;
use std::path::{Path, PathBuf};

/// Error types for unibuild operations.
///
/// Variants follow the lifecycle: environment problems are detected first,
/// then configure and build failures for a single architecture, then merge
/// failures. None of them are retried.
///
/// # Example
///
/// ```
/// use unibuild_sdk::BuildError;
///
/// let err = BuildError::MissingTools(vec!["autoconf".to_string()]);
/// assert!(err.to_string().contains("autoconf"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// One or more required executables are not on `PATH`.
    #[error("missing required tools: {}. Install them and make sure they are on PATH", .0.join(", "))]
    MissingTools(Vec<String>),

    /// An SDK, NDK or other external prerequisite could not be located.
    #[error("environment error: {0}")]
    Environment(String),

    /// Bootstrapping or running the configure script failed.
    #[error("configure error: {0}")]
    Configure(String),

    /// Compiling or installing failed.
    #[error("build error: {0}")]
    Build(String),

    /// Combining the per-architecture products failed.
    #[error("merge error: {0}")]
    Merge(String),

    /// Cleaning the prefix or source tree failed.
    #[error("clean error: {0}")]
    Clean(String),

    /// Invalid or inconsistent settings.
    #[error("settings error: {0}")]
    Settings(String),

    /// The requested platform name is not recognised.
    #[error("unknown platform '{0}'. Supported platforms: host, macos, ios, android")]
    UnknownPlatform(String),

    /// The architecture has no toolchain mapping on this platform.
    #[error("architecture '{arch}' is not supported on {platform}")]
    UnsupportedArch {
        /// Platform that rejected the architecture.
        platform: Platform,
        /// The rejected architecture name.
        arch: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}. Check file paths and permissions")]
    Io(#[from] std::io::Error),

    /// Writing the success marker record failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Target platform for a build.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Native macOS build producing fat binaries.
    Macos,
    /// iOS device and simulator slices combined into fat binaries.
    Ios,
    /// Android NDK build producing one `lib/<abi>/` directory per architecture.
    Android,
}

impl Platform {
    /// Every platform the engine knows how to build for.
    pub const ALL: [Platform; 3] = [Platform::Macos, Platform::Ios, Platform::Android];

    /// Returns the string representation of the platform.
    ///
    /// ```
    /// use unibuild_sdk::Platform;
    ///
    /// assert_eq!(Platform::Android.as_str(), "android");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Macos => "macos",
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }

    /// Parses a concrete platform name. `host` is handled by [`PlatformSelection`].
    pub fn from_name(name: &str) -> Result<Self, BuildError> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| BuildError::UnknownPlatform(name.to_string()))
    }

    /// Resolves the machine this process runs on to a platform and its native
    /// architecture.
    ///
    /// Only macOS hosts are recognised; anything else fails instead of
    /// producing an empty architecture list.
    pub fn host() -> Result<(Self, String), BuildError> {
        Self::host_from(std::env::consts::OS, std::env::consts::ARCH)
    }

    fn host_from(os: &str, arch: &str) -> Result<(Self, String), BuildError> {
        if os != "macos" {
            return Err(BuildError::UnknownPlatform(format!(
                "host ({}). Only macOS hosts can be resolved automatically; \
                 name the platform explicitly, e.g. `android`",
                os
            )));
        }
        let native = match arch {
            "aarch64" => "arm64",
            other => other,
        };
        Ok((Platform::Macos, native.to_string()))
    }

    /// Returns how per-architecture products are merged on this platform.
    pub fn merge_layout(&self) -> MergeLayout {
        match self {
            Platform::Macos | Platform::Ios => MergeLayout::Fat,
            Platform::Android => MergeLayout::PerAbi,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform as requested on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlatformSelection {
    /// The machine running the build, with its native architecture only.
    #[default]
    Host,
    /// An explicitly named platform.
    Named(Platform),
}

impl PlatformSelection {
    /// Parses `host` or a concrete platform name.
    pub fn parse(name: &str) -> Result<Self, BuildError> {
        if name == "host" {
            Ok(PlatformSelection::Host)
        } else {
            Platform::from_name(name).map(PlatformSelection::Named)
        }
    }
}

/// How a platform combines per-architecture install roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeLayout {
    /// One multi-architecture binary per library file (`lipo -create`).
    Fat,
    /// One `lib/<abi>/` directory per architecture.
    PerAbi,
}

/// The library source tree being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    /// Library name as given on the command line.
    pub name: String,
    /// Path to the source tree.
    pub path: PathBuf,
}

impl Library {
    /// Resolves `name` relative to `base` and checks that it is a directory.
    pub fn resolve(base: &Path, name: &str) -> Result<Self, BuildError> {
        let path = base.join(name);
        if !path.is_dir() {
            return Err(BuildError::Environment(format!(
                "library source tree not found: {}\n\n\
                 Run unibuild from the directory that contains '{}'.",
                path.display(),
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            path,
        })
    }
}

/// Everything the orchestrator needs to run one invocation.
///
/// # Example
///
/// ```
/// use unibuild_sdk::{BuildRequest, Platform, PlatformSelection};
///
/// let request = BuildRequest::new("libfoo")
///     .platform(PlatformSelection::Named(Platform::Android))
///     .archs(vec!["arm".into(), "arm64".into()]);
/// assert!(!request.clean);
/// ```
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Library directory name, relative to the invocation directory.
    pub library: String,
    /// Requested platform.
    pub platform: PlatformSelection,
    /// Explicit architecture list; `None` uses the platform default.
    pub archs: Option<Vec<String>>,
    /// Run the clean path and stop.
    pub clean: bool,
}

impl BuildRequest {
    /// Creates a host-platform build request for `library`.
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            platform: PlatformSelection::Host,
            archs: None,
            clean: false,
        }
    }

    /// Sets the platform.
    pub fn platform(mut self, platform: PlatformSelection) -> Self {
        self.platform = platform;
        self
    }

    /// Overrides the architecture list.
    pub fn archs(mut self, archs: Vec<String>) -> Self {
        self.archs = Some(archs);
        self
    }

    /// Selects the clean path.
    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }
}

/// Terminal result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// All architectures were built and merged.
    Built {
        /// The merged output directory.
        out_dir: PathBuf,
    },
    /// A success marker was found; nothing was done.
    AlreadyBuilt {
        /// The existing output directory.
        out_dir: PathBuf,
    },
    /// The prefix and source tree were cleaned.
    Cleaned {
        /// The removed prefix.
        prefix: PathBuf,
    },
}
