//! Android toolchain.
//!
//! Each architecture gets its own NDK standalone toolchain, installed under
//! `<prefix>/toolchains/<arch>` at API level 21 (the first level with 64-bit
//! ABIs). The toolchain's `bin/` goes in front of `PATH`, the compiler is
//! pinned to the toolchain's clang, and libtool is asked not to version
//! shared objects so they load from an APK's `lib/<abi>/`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::{Overlay, Toolchain, append_ambient};
use crate::common::run_command;
use crate::settings::Settings;
use crate::types::{BuildError, Platform};
use crate::workspace::Prefix;

/// Optimization flags for C and C++.
pub const OPT_FLAGS: &str = "-O2";

/// Maps an NDK architecture name to its GNU host triple.
pub fn host_triple_for(arch: &str) -> Option<&'static str> {
    match arch {
        "arm" => Some("arm-linux-androideabi"),
        "arm64" => Some("aarch64-linux-android"),
        "x86" => Some("i686-linux-android"),
        "x86_64" => Some("x86_64-linux-android"),
        _ => None,
    }
}

/// Android NDK toolchain.
#[derive(Debug, Clone)]
pub struct AndroidToolchain {
    settings: Settings,
}

impl AndroidToolchain {
    /// Creates a toolchain using `settings.ndk_root` and `settings.android_api_level`.
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Returns the NDK root or fails with the variable to set.
    pub fn ndk_root(&self) -> Result<&Path, BuildError> {
        let root = self.settings.ndk_root.as_deref().ok_or_else(|| {
            BuildError::Environment(
                "Android NDK not configured.\n\n\
                 Set ANDROID_NDK_ROOT (or ANDROID_NDK_HOME) to the NDK install directory, \
                 or add `ndk_root` under [android] in unibuild.toml."
                    .to_string(),
            )
        })?;
        if !root.is_dir() {
            return Err(BuildError::Environment(format!(
                "Android NDK root does not exist: {}\n\n\
                 Check ANDROID_NDK_ROOT points at an installed NDK.",
                root.display()
            )));
        }
        Ok(root)
    }

    fn standalone_script(&self) -> Result<PathBuf, BuildError> {
        let script = self
            .ndk_root()?
            .join("build")
            .join("tools")
            .join("make_standalone_toolchain.py");
        if !script.is_file() {
            return Err(BuildError::Environment(format!(
                "NDK standalone toolchain script not found: {}\n\n\
                 Use an NDK release that ships make_standalone_toolchain.py.",
                script.display()
            )));
        }
        Ok(script)
    }

    /// Installs the standalone toolchain for `arch` into `install_dir`.
    ///
    /// An existing installation (one with a `bin/` directory) is reused.
    pub fn install_standalone(&self, arch: &str, install_dir: &Path) -> Result<(), BuildError> {
        if install_dir.join("bin").is_dir() {
            debug!(arch, dir = %install_dir.display(), "reusing standalone toolchain");
            return Ok(());
        }
        let script = self.standalone_script()?;
        info!(arch, api = self.settings.android_api_level, "installing NDK standalone toolchain");

        let mut cmd = Command::new(&script);
        cmd.arg("--arch")
            .arg(arch)
            .arg("--api")
            .arg(self.settings.android_api_level.to_string())
            .arg("--install-dir")
            .arg(install_dir)
            .arg("--force");
        run_command(
            cmd,
            &format!("standalone toolchain install for {}", arch),
            BuildError::Environment,
        )
    }

    /// Builds the overlay for `arch` using a toolchain already installed at
    /// `toolchain_dir`.
    pub fn overlay_for_toolchain(
        &self,
        arch: &str,
        toolchain_dir: &Path,
    ) -> Result<Overlay, BuildError> {
        let mut overlay = Overlay::new();
        overlay.host_triple = self.host_triple(arch)?;
        overlay.path_prepend.push(toolchain_dir.join("bin"));
        overlay
            .set("CC", "clang")
            .set("CXX", "clang++")
            .set_flags("CFLAGS", OPT_FLAGS, &self.settings)
            .set_flags("CXXFLAGS", OPT_FLAGS, &self.settings);
        if let Some(cppflags) = self.settings.ambient_flag("CPPFLAGS") {
            overlay.set("CPPFLAGS", cppflags);
        }
        if let Some(ldflags) = self.settings.ambient_flag("LDFLAGS") {
            overlay.set("LDFLAGS", ldflags);
        }
        overlay.make_args.push(format!(
            "LDFLAGS={}",
            append_ambient("-avoid-version", self.settings.ambient_flag("LDFLAGS"))
        ));
        Ok(overlay)
    }
}

impl Toolchain for AndroidToolchain {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    fn check_arch(&self, arch: &str) -> Result<(), BuildError> {
        host_triple_for(arch)
            .map(|_| ())
            .ok_or_else(|| BuildError::UnsupportedArch {
                platform: Platform::Android,
                arch: arch.to_string(),
            })
    }

    fn host_triple(&self, arch: &str) -> Result<Option<String>, BuildError> {
        self.check_arch(arch)?;
        Ok(host_triple_for(arch).map(str::to_string))
    }

    fn overlay(&self, prefix: &Prefix, arch: &str) -> Result<Overlay, BuildError> {
        self.check_arch(arch)?;
        let toolchain_dir = prefix.toolchain_dir(arch);
        self.install_standalone(arch, &toolchain_dir)?;
        self.overlay_for_toolchain(arch, &toolchain_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn triples() {
        assert_eq!(host_triple_for("arm"), Some("arm-linux-androideabi"));
        assert_eq!(host_triple_for("arm64"), Some("aarch64-linux-android"));
        assert_eq!(host_triple_for("x86"), Some("i686-linux-android"));
        assert_eq!(host_triple_for("x86_64"), Some("x86_64-linux-android"));
        assert_eq!(host_triple_for("mips"), None);
    }

    #[test]
    fn missing_ndk_fails_loudly() {
        let tc = AndroidToolchain::new(Settings::default());
        let err = tc.overlay(&Prefix::at("/unused"), "arm").unwrap_err();
        assert!(matches!(err, BuildError::Environment(_)));
        assert!(err.to_string().contains("ANDROID_NDK_ROOT"));
    }

    #[test]
    fn nonexistent_ndk_fails() {
        let settings = Settings {
            ndk_root: Some(PathBuf::from("/nonexistent/ndk-12345")),
            ..Settings::default()
        };
        let err = AndroidToolchain::new(settings).ndk_root().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn ndk_without_script_fails() {
        let temp = TempDir::new().unwrap();
        let settings = Settings {
            ndk_root: Some(temp.path().to_path_buf()),
            ..Settings::default()
        };
        let tc = AndroidToolchain::new(settings);
        let err = tc
            .overlay(&Prefix::at(temp.path().join("prefix")), "arm64")
            .unwrap_err();
        assert!(err.to_string().contains("make_standalone_toolchain.py"));
    }

    #[test]
    fn installed_toolchain_is_reused() {
        let temp = TempDir::new().unwrap();
        let prefix = Prefix::at(temp.path().join("prefix"));
        std::fs::create_dir_all(prefix.toolchain_dir("x86").join("bin")).unwrap();
        let settings = Settings {
            ndk_root: Some(temp.path().to_path_buf()),
            ..Settings::default()
        };

        let overlay = AndroidToolchain::new(settings).overlay(&prefix, "x86").unwrap();
        assert_eq!(overlay.host_triple.as_deref(), Some("i686-linux-android"));
        assert_eq!(overlay.path_prepend, vec![prefix.toolchain_dir("x86").join("bin")]);
    }

    #[test]
    fn overlay_contents() {
        let mut settings = Settings::default();
        settings
            .ambient_flags
            .insert("LDFLAGS".to_string(), "-L/extra".to_string());
        let tc = AndroidToolchain::new(settings);
        let overlay = tc.overlay_for_toolchain("arm", Path::new("/tc")).unwrap();

        assert_eq!(overlay.get("CC"), Some("clang"));
        assert_eq!(overlay.get("CXX"), Some("clang++"));
        assert_eq!(overlay.get("CFLAGS"), Some("-O2"));
        assert_eq!(overlay.get("LDFLAGS"), Some("-L/extra"));
        assert_eq!(overlay.make_args, vec!["LDFLAGS=-avoid-version -L/extra"]);
        assert_eq!(overlay.path_prepend, vec![PathBuf::from("/tc/bin")]);
        assert!(overlay.configure_args.is_empty());
    }

    #[test]
    fn unsupported_arch() {
        let tc = AndroidToolchain::new(Settings::default());
        assert!(matches!(
            tc.check_arch("armv7"),
            Err(BuildError::UnsupportedArch { .. })
        ));
        assert!(tc.overlay_for_toolchain("mips", Path::new("/tc")).is_err());
    }
}
