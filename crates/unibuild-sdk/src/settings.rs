//! Engine settings.
//!
//! [`Settings`] is resolved once before orchestration starts and then only
//! read. The process environment is captured into it by
//! [`Settings::with_process_env`]; nothing in the engine reads compiler flags
//! or SDK roots from the environment afterwards.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use crate::types::Platform;

/// Default macOS deployment target.
pub const DEFAULT_MACOS_DEPLOYMENT_TARGET: &str = "10.8";
/// Default iOS deployment target (device and simulator).
pub const DEFAULT_IOS_DEPLOYMENT_TARGET: &str = "8.0";
/// Lowest Android API level that supports 64-bit ABIs.
pub const DEFAULT_ANDROID_API_LEVEL: u32 = 21;
/// Parallelism used when the CPU count cannot be detected.
pub const FALLBACK_JOBS: usize = 3;

/// Compiler and linker flag variables appended to every overlay.
pub const AMBIENT_FLAG_VARS: [&str; 4] = ["CFLAGS", "CXXFLAGS", "CPPFLAGS", "LDFLAGS"];

/// Resolved configuration for one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Parallel jobs for `make`; `None` detects the CPU count.
    pub jobs: Option<usize>,
    /// Extra arguments appended to every configure invocation.
    pub configure_args: Vec<String>,
    /// Executables checked by the `initialize` hook.
    pub required_tools: Vec<String>,
    /// `-mmacosx-version-min` value.
    pub macos_deployment_target: String,
    /// `-miphoneos-version-min` / `-mios-simulator-version-min` value.
    pub ios_deployment_target: String,
    /// Android NDK root, required for android builds.
    pub ndk_root: Option<PathBuf>,
    /// Android API level for standalone toolchains.
    pub android_api_level: u32,
    /// Per-platform architecture lists overriding the built-in defaults.
    pub archs: BTreeMap<Platform, Vec<String>>,
    /// Ambient flag values captured from the environment, keyed by variable.
    pub ambient_flags: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jobs: None,
            configure_args: Vec::new(),
            required_tools: vec!["autoconf".to_string(), "automake".to_string()],
            macos_deployment_target: DEFAULT_MACOS_DEPLOYMENT_TARGET.to_string(),
            ios_deployment_target: DEFAULT_IOS_DEPLOYMENT_TARGET.to_string(),
            ndk_root: None,
            android_api_level: DEFAULT_ANDROID_API_LEVEL,
            archs: BTreeMap::new(),
            ambient_flags: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Creates settings with built-in defaults and nothing captured from the
    /// environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Layers environment variables over `self`.
    ///
    /// Reads `ANDROID_NDK_ROOT` (falling back to `ANDROID_NDK_HOME`),
    /// `MACOSX_DEPLOYMENT_TARGET`, `IPHONEOS_DEPLOYMENT_TARGET` and the
    /// ambient flag variables.
    pub fn with_process_env(self) -> Self {
        self.with_env(|key| env::var(key).ok())
    }

    /// Same as [`Settings::with_process_env`] with an explicit lookup function.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(ndk) = non_empty("ANDROID_NDK_ROOT").or_else(|| non_empty("ANDROID_NDK_HOME")) {
            self.ndk_root = Some(PathBuf::from(ndk));
        }
        if let Some(target) = non_empty("MACOSX_DEPLOYMENT_TARGET") {
            self.macos_deployment_target = target;
        }
        if let Some(target) = non_empty("IPHONEOS_DEPLOYMENT_TARGET") {
            self.ios_deployment_target = target;
        }
        for var in AMBIENT_FLAG_VARS {
            if let Some(value) = non_empty(var) {
                self.ambient_flags.insert(var.to_string(), value);
            }
        }
        self
    }

    /// Returns the architecture list for `platform`.
    pub fn default_archs(&self, platform: Platform) -> Vec<String> {
        if let Some(archs) = self.archs.get(&platform) {
            return archs.clone();
        }
        let builtin: &[&str] = match platform {
            Platform::Macos => &["x86_64", "arm64"],
            Platform::Ios => &["armv7", "arm64", "i386", "x86_64"],
            Platform::Android => &["arm", "arm64", "x86", "x86_64"],
        };
        builtin.iter().map(|a| a.to_string()).collect()
    }

    /// Returns the ambient value for a flag variable, if one was captured.
    pub fn ambient_flag(&self, var: &str) -> Option<&str> {
        self.ambient_flags.get(var).map(String::as_str)
    }

    /// Parallel job count for `make`.
    pub fn parallelism(&self) -> usize {
        self.jobs.filter(|j| *j > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(FALLBACK_JOBS)
        })
    }
}
