//! Configuration file support for unibuild.
//!
//! This module provides support for `unibuild.toml` configuration files that
//! let a checkout pin its NDK, deployment targets and architecture lists
//! instead of passing flags on every run.
//!
//! ## Configuration File Location
//!
//! The configuration file is searched for in the following order:
//! 1. Current working directory (`./unibuild.toml`)
//! 2. Parent directories (up to the repository root or filesystem root)
//!
//! `--config <path>` skips discovery.
//!
//! ## Example Configuration
//!
//! ```toml
//! [build]
//! jobs = 8
//! configure_args = ["--enable-static"]
//! required_tools = ["autoconf", "automake", "libtool"]
//!
//! [macos]
//! deployment_target = "10.13"
//! archs = ["x86_64", "arm64"]
//!
//! [ios]
//! deployment_target = "12.0"
//! archs = ["arm64", "x86_64"]
//!
//! [android]
//! ndk_root = "/opt/android-ndk-r19c"
//! api_level = 21
//! archs = ["arm", "arm64"]
//! ```
//!
//! Environment variables (`ANDROID_NDK_ROOT`, `MACOSX_DEPLOYMENT_TARGET`,
//! `IPHONEOS_DEPLOYMENT_TARGET`) override file values; CLI flags override both.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use unibuild_sdk::{Platform, Settings};

/// The default configuration file name.
pub const CONFIG_FILE_NAME: &str = "unibuild.toml";

/// Root configuration structure for `unibuild.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnibuildConfig {
    /// Settings shared by every platform.
    pub build: BuildConfig,

    /// macOS configuration.
    pub macos: AppleConfig,

    /// iOS configuration.
    pub ios: AppleConfig,

    /// Android configuration.
    pub android: AndroidConfig,
}

/// Settings shared by every platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Parallel `make` jobs.
    ///
    /// Defaults to the detected CPU count.
    pub jobs: Option<usize>,

    /// Extra arguments appended to every configure invocation.
    pub configure_args: Vec<String>,

    /// Executables that must be on `PATH` before building.
    ///
    /// Defaults to `["autoconf", "automake"]`.
    pub required_tools: Option<Vec<String>>,
}

/// macOS or iOS configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppleConfig {
    /// Minimum OS version passed to the compiler.
    pub deployment_target: Option<String>,

    /// Architectures to build when none are given on the command line.
    pub archs: Option<Vec<String>>,
}

/// Android configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AndroidConfig {
    /// NDK install directory.
    pub ndk_root: Option<PathBuf>,

    /// API level for the standalone toolchains.
    ///
    /// Defaults to 21.
    pub api_level: Option<u32>,

    /// Architectures to build when none are given on the command line.
    pub archs: Option<Vec<String>>,
}

impl UnibuildConfig {
    /// Loads configuration from the specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: UnibuildConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(config)
    }

    /// Attempts to find and load configuration starting from the specified
    /// directory and walking up the tree.
    ///
    /// # Returns
    ///
    /// * `Ok(Some((config, path)))` - Found and loaded configuration with its path
    /// * `Ok(None)` - No configuration file found
    /// * `Err` - If a config file was found but couldn't be parsed
    pub fn discover_from(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.is_file() {
                let config = Self::load_from_file(&config_path)?;
                return Ok(Some((config, config_path)));
            }

            // Stop at repository root or filesystem root
            if current.join(".git").exists() || !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Layers file values over `settings`.
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(jobs) = self.build.jobs {
            settings.jobs = Some(jobs);
        }
        settings
            .configure_args
            .extend(self.build.configure_args.iter().cloned());
        if let Some(tools) = &self.build.required_tools {
            settings.required_tools = tools.clone();
        }

        if let Some(target) = &self.macos.deployment_target {
            settings.macos_deployment_target = target.clone();
        }
        if let Some(target) = &self.ios.deployment_target {
            settings.ios_deployment_target = target.clone();
        }
        if let Some(root) = &self.android.ndk_root {
            settings.ndk_root = Some(root.clone());
        }
        if let Some(level) = self.android.api_level {
            settings.android_api_level = level;
        }

        for (platform, archs) in [
            (Platform::Macos, &self.macos.archs),
            (Platform::Ios, &self.ios.archs),
            (Platform::Android, &self.android.archs),
        ] {
            if let Some(archs) = archs {
                settings.archs.insert(platform, archs.clone());
            }
        }
        settings
    }
}

/// Configuration resolver that layers the config file, the environment and
/// CLI arguments.
///
/// CLI arguments always take precedence over the environment, which takes
/// precedence over config file values.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    /// Loaded configuration, if any.
    pub config: Option<UnibuildConfig>,

    /// Path to the loaded config file, if any.
    pub config_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Creates a resolver from an explicit config path, or by discovery
    /// starting at `start_dir`.
    pub fn new(explicit: Option<&Path>, start_dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            let config = UnibuildConfig::load_from_file(path)?;
            return Ok(Self {
                config: Some(config),
                config_path: Some(path.to_path_buf()),
            });
        }
        match UnibuildConfig::discover_from(start_dir)? {
            Some((config, path)) => Ok(Self {
                config: Some(config),
                config_path: Some(path),
            }),
            None => Ok(Self::default()),
        }
    }

    /// Resolves engine settings: defaults, then the config file, then the
    /// environment as seen through `lookup`.
    pub fn settings<F>(&self, lookup: F) -> Settings
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = match &self.config {
            Some(config) => config.apply(Settings::new()),
            None => Settings::new(),
        };
        settings.with_env(lookup)
    }
}
