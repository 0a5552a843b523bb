//! macOS toolchain.
//!
//! Builds natively (no `--host`) once per architecture with `-arch`, link-time
//! optimization and a minimum OS version, against the SDK reported by
//! `xcrun --sdk macosx`.

use std::path::{Path, PathBuf};

use super::{Overlay, Toolchain, apple_sdk_path};
use crate::settings::Settings;
use crate::types::{BuildError, Platform};
use crate::workspace::Prefix;

/// Architectures clang accepts for macOS slices.
pub const SUPPORTED_ARCHS: [&str; 5] = ["x86_64", "x86_64h", "arm64", "arm64e", "i386"];

/// macOS toolchain.
#[derive(Debug, Clone)]
pub struct MacosToolchain {
    settings: Settings,
    sdk_root: Option<PathBuf>,
}

impl MacosToolchain {
    /// Creates a toolchain that resolves the SDK with `xcrun`.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            sdk_root: None,
        }
    }

    /// Uses `sdk_root` instead of asking `xcrun`.
    pub fn with_sdk_root(mut self, sdk_root: impl Into<PathBuf>) -> Self {
        self.sdk_root = Some(sdk_root.into());
        self
    }

    fn sdk_root(&self) -> Result<PathBuf, BuildError> {
        match &self.sdk_root {
            Some(root) => Ok(root.clone()),
            None => apple_sdk_path("macosx"),
        }
    }

    /// Builds the overlay for `arch` against a known SDK root.
    pub fn overlay_with_sdk(&self, arch: &str, sdk_root: &Path) -> Overlay {
        let target = &self.settings.macos_deployment_target;
        let flags = format!(
            "-arch {} -flto -mmacosx-version-min={} -isysroot {}",
            arch,
            target,
            sdk_root.display()
        );

        let mut overlay = Overlay::new();
        overlay
            .set("SDKROOT", sdk_root.display().to_string())
            .set("MACOSX_DEPLOYMENT_TARGET", target.clone())
            .set_flags("CFLAGS", &flags, &self.settings)
            .set_flags("CXXFLAGS", &flags, &self.settings)
            .set_flags("LDFLAGS", &flags, &self.settings);
        if let Some(cppflags) = self.settings.ambient_flag("CPPFLAGS") {
            overlay.set("CPPFLAGS", cppflags);
        }
        overlay
    }
}

impl Toolchain for MacosToolchain {
    fn platform(&self) -> Platform {
        Platform::Macos
    }

    fn check_arch(&self, arch: &str) -> Result<(), BuildError> {
        if SUPPORTED_ARCHS.contains(&arch) {
            Ok(())
        } else {
            Err(BuildError::UnsupportedArch {
                platform: Platform::Macos,
                arch: arch.to_string(),
            })
        }
    }

    fn host_triple(&self, arch: &str) -> Result<Option<String>, BuildError> {
        self.check_arch(arch)?;
        Ok(None)
    }

    fn overlay(&self, _prefix: &Prefix, arch: &str) -> Result<Overlay, BuildError> {
        self.check_arch(arch)?;
        let sdk_root = self.sdk_root()?;
        let mut overlay = self.overlay_with_sdk(arch, &sdk_root);
        overlay.host_triple = self.host_triple(arch)?;
        Ok(overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_build_has_no_host_triple() {
        let tc = MacosToolchain::new(Settings::default());
        assert_eq!(tc.host_triple("x86_64").unwrap(), None);
        assert!(matches!(
            tc.host_triple("armv7"),
            Err(BuildError::UnsupportedArch { .. })
        ));
    }

    #[test]
    fn overlay_flags() {
        let tc = MacosToolchain::new(Settings::default());
        let overlay = tc.overlay_with_sdk("arm64", Path::new("/sdk/MacOSX.sdk"));

        let cflags = overlay.get("CFLAGS").unwrap();
        assert!(cflags.contains("-arch arm64"));
        assert!(cflags.contains("-flto"));
        assert!(cflags.contains("-mmacosx-version-min=10.8"));
        assert!(cflags.contains("-isysroot /sdk/MacOSX.sdk"));
        assert_eq!(overlay.get("LDFLAGS"), Some(cflags));
        assert_eq!(overlay.get("SDKROOT"), Some("/sdk/MacOSX.sdk"));
        assert!(overlay.host_triple.is_none());
        assert!(overlay.configure_args.is_empty());
    }

    #[test]
    fn deployment_target_and_ambient_flags() {
        let mut settings = Settings {
            macos_deployment_target: "11.0".to_string(),
            ..Settings::default()
        };
        settings
            .ambient_flags
            .insert("LDFLAGS".to_string(), "-L/opt/lib".to_string());
        settings
            .ambient_flags
            .insert("CPPFLAGS".to_string(), "-I/opt/include".to_string());

        let tc = MacosToolchain::new(settings);
        let overlay = tc.overlay_with_sdk("x86_64", Path::new("/sdk"));
        assert!(overlay.get("CFLAGS").unwrap().contains("-mmacosx-version-min=11.0"));
        assert!(overlay.get("LDFLAGS").unwrap().ends_with("-isysroot /sdk -L/opt/lib"));
        assert_eq!(overlay.get("CPPFLAGS"), Some("-I/opt/include"));
    }

    #[test]
    fn pinned_sdk_skips_xcrun() {
        let tc = MacosToolchain::new(Settings::default()).with_sdk_root("/pinned");
        let overlay = tc.overlay(&Prefix::at("/unused"), "x86_64").unwrap();
        assert_eq!(overlay.get("SDKROOT"), Some("/pinned"));
    }
}
