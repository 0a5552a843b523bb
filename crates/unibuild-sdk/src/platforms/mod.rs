//! Per-platform toolchain environments.
//!
//! Each [`Platform`] has one [`Toolchain`] implementation that turns an
//! architecture name into an [`Overlay`]: the compiler and linker variables,
//! search path additions, cross-compile host triple and extra configure or
//! make arguments for that architecture's build.
//!
//! | Toolchain | Platform | Host triple | SDK |
//! |-----------|----------|-------------|-----|
//! | [`MacosToolchain`] | macOS | none (native) | `xcrun --sdk macosx` |
//! | [`IosToolchain`] | iOS | `arm-apple-darwin` / `<arch>-apple-darwin` | `iphoneos` / `iphonesimulator` |
//! | [`AndroidToolchain`] | Android | `<arch>-linux-android*` | NDK standalone toolchain |
//!
//! Overlays are plain values built fresh for every architecture. They are
//! applied to a [`Command`] right before it is spawned and never touch the
//! environment of the running process, so one architecture's flags cannot
//! leak into the next.

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Command;

use crate::common::capture_stdout;
use crate::settings::Settings;
use crate::types::{BuildError, Platform};
use crate::workspace::Prefix;

pub mod android;
pub mod ios;
pub mod macos;

pub use android::AndroidToolchain;
pub use ios::IosToolchain;
pub use macos::MacosToolchain;

/// Environment and arguments for one architecture's build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlay {
    /// `--host` value for configure; `None` for native builds.
    pub host_triple: Option<String>,
    /// Variables set on every subprocess of this architecture's build.
    pub env: BTreeMap<String, String>,
    /// Directories placed in front of the inherited `PATH`.
    pub path_prepend: Vec<PathBuf>,
    /// Arguments appended to configure after `--host` and `--prefix`.
    pub configure_args: Vec<String>,
    /// Variable assignments appended to every `make` invocation.
    pub make_args: Vec<String>,
}

impl Overlay {
    /// Creates an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an environment variable.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Sets a flag variable to `computed` followed by its ambient value.
    pub fn set_flags(&mut self, var: &str, computed: &str, settings: &Settings) -> &mut Self {
        let value = append_ambient(computed, settings.ambient_flag(var));
        self.set(var, value)
    }

    /// Returns an environment variable set by this overlay.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Applies the overlay to `cmd`. The current process is not modified.
    pub fn apply(&self, cmd: &mut Command) -> Result<(), BuildError> {
        cmd.envs(&self.env);
        if !self.path_prepend.is_empty() {
            cmd.env("PATH", self.search_path(env::var_os("PATH"))?);
        }
        Ok(())
    }

    fn search_path(&self, inherited: Option<OsString>) -> Result<OsString, BuildError> {
        let mut paths = self.path_prepend.clone();
        if let Some(inherited) = inherited {
            paths.extend(env::split_paths(&inherited));
        }
        env::join_paths(paths).map_err(|e| {
            BuildError::Environment(format!("Failed to build PATH for toolchain: {}", e))
        })
    }
}

/// Joins a computed flag string with an ambient one, computed first.
pub fn append_ambient(computed: &str, ambient: Option<&str>) -> String {
    match ambient.map(str::trim).filter(|a| !a.is_empty()) {
        Some(ambient) if computed.is_empty() => ambient.to_string(),
        Some(ambient) => format!("{} {}", computed, ambient),
        None => computed.to_string(),
    }
}

/// Strategy for computing a platform's per-architecture environment.
pub trait Toolchain {
    /// The platform this toolchain builds for.
    fn platform(&self) -> Platform;

    /// Fails with [`BuildError::UnsupportedArch`] if `arch` cannot be built.
    fn check_arch(&self, arch: &str) -> Result<(), BuildError>;

    /// Cross-compile host triple for `arch`, or `None` for native builds.
    fn host_triple(&self, arch: &str) -> Result<Option<String>, BuildError>;

    /// Computes the overlay for `arch`, resolving SDKs or installing
    /// toolchains under `prefix` as needed.
    fn overlay(&self, prefix: &Prefix, arch: &str) -> Result<Overlay, BuildError>;
}

/// Returns the toolchain for `platform`.
pub fn toolchain_for(platform: Platform, settings: &Settings) -> Box<dyn Toolchain> {
    match platform {
        Platform::Macos => Box::new(MacosToolchain::new(settings.clone())),
        Platform::Ios => Box::new(IosToolchain::new(settings.clone())),
        Platform::Android => Box::new(AndroidToolchain::new(settings.clone())),
    }
}

/// Resolves an Apple SDK root with `xcrun --sdk <sdk> --show-sdk-path`.
pub fn apple_sdk_path(sdk: &str) -> Result<PathBuf, BuildError> {
    let mut cmd = Command::new("xcrun");
    cmd.args(["--sdk", sdk, "--show-sdk-path"]);
    let path = capture_stdout(cmd, &format!("xcrun lookup of the {} SDK", sdk), |detail| {
        BuildError::Environment(format!(
            "{}\n\nInstall Xcode (or the Command Line Tools) and select it with xcode-select.",
            detail
        ))
    })?;
    if path.is_empty() {
        return Err(BuildError::Environment(format!(
            "xcrun returned an empty path for the {} SDK",
            sdk
        )));
    }
    Ok(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_ambient_keeps_computed_first() {
        assert_eq!(append_ambient("-O2", Some("-g")), "-O2 -g");
        assert_eq!(append_ambient("-O2", None), "-O2");
        assert_eq!(append_ambient("-O2", Some("  ")), "-O2");
        assert_eq!(append_ambient("", Some("-g")), "-g");
    }

    #[test]
    fn set_flags_appends_ambient() {
        let mut settings = Settings::default();
        settings
            .ambient_flags
            .insert("CFLAGS".to_string(), "-DUSER".to_string());

        let mut overlay = Overlay::new();
        overlay.set_flags("CFLAGS", "-arch arm64", &settings);
        overlay.set_flags("LDFLAGS", "-arch arm64", &settings);

        assert_eq!(overlay.get("CFLAGS"), Some("-arch arm64 -DUSER"));
        assert_eq!(overlay.get("LDFLAGS"), Some("-arch arm64"));
    }

    #[test]
    fn search_path_prepends_toolchain() {
        let overlay = Overlay {
            path_prepend: vec![PathBuf::from("/tc/bin")],
            ..Overlay::default()
        };
        let inherited = env::join_paths([PathBuf::from("/usr/bin")]).unwrap();
        let joined = overlay.search_path(Some(inherited)).unwrap();
        let parts: Vec<PathBuf> = env::split_paths(&joined).collect();
        assert_eq!(parts, vec![PathBuf::from("/tc/bin"), PathBuf::from("/usr/bin")]);
    }

    #[test]
    fn apply_sets_env_on_command_only() {
        let mut overlay = Overlay::new();
        overlay.set("UNIBUILD_OVERLAY_TEST", "1");
        let mut cmd = Command::new("true");
        overlay.apply(&mut cmd).unwrap();

        let envs: Vec<_> = cmd.get_envs().collect();
        assert!(envs.iter().any(|(k, v)| *k == "UNIBUILD_OVERLAY_TEST"
            && v.map(|v| v == "1").unwrap_or(false)));
        assert!(env::var_os("UNIBUILD_OVERLAY_TEST").is_none());
    }

    #[test]
    fn unresolvable_sdk_is_an_environment_error() {
        let err = apple_sdk_path("no-such-sdk-12345").unwrap_err();
        assert!(matches!(err, BuildError::Environment(_)));
        assert!(err.to_string().contains("no-such-sdk-12345"));
    }

    #[test]
    fn toolchain_for_matches_platform() {
        let settings = Settings::default();
        for platform in Platform::ALL {
            assert_eq!(toolchain_for(platform, &settings).platform(), platform);
        }
    }
}
