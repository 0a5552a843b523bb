//! iOS toolchain.
//!
//! Architectures whose name contains `arm` are device slices: they cross
//! compile for `arm-apple-darwin` against the `iphoneos` SDK with bitcode
//! embedded, and configure is told `--disable-shared`. Everything else is a
//! simulator slice built for `<arch>-apple-darwin` against `iphonesimulator`.

use std::path::{Path, PathBuf};

use super::{Overlay, Toolchain, apple_sdk_path};
use crate::settings::Settings;
use crate::types::{BuildError, Platform};
use crate::workspace::Prefix;

/// Device architectures.
pub const DEVICE_ARCHS: [&str; 4] = ["armv7", "armv7s", "arm64", "arm64e"];
/// Simulator architectures.
pub const SIMULATOR_ARCHS: [&str; 2] = ["i386", "x86_64"];

/// Which half of the iOS SDK an architecture targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IosSdk {
    /// Physical devices (`iphoneos`).
    Device,
    /// The simulator (`iphonesimulator`).
    Simulator,
}

impl IosSdk {
    /// Classifies `arch`: any name containing `arm` is a device slice.
    pub fn for_arch(arch: &str) -> Self {
        if arch.contains("arm") {
            IosSdk::Device
        } else {
            IosSdk::Simulator
        }
    }

    /// Name passed to `xcrun --sdk`.
    pub fn sdk_name(&self) -> &'static str {
        match self {
            IosSdk::Device => "iphoneos",
            IosSdk::Simulator => "iphonesimulator",
        }
    }

    fn version_min_flag(&self) -> &'static str {
        match self {
            IosSdk::Device => "-miphoneos-version-min",
            IosSdk::Simulator => "-mios-simulator-version-min",
        }
    }
}

/// iOS toolchain.
#[derive(Debug, Clone)]
pub struct IosToolchain {
    settings: Settings,
    device_sdk: Option<PathBuf>,
    simulator_sdk: Option<PathBuf>,
}

impl IosToolchain {
    /// Creates a toolchain that resolves SDKs with `xcrun`.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            device_sdk: None,
            simulator_sdk: None,
        }
    }

    /// Uses fixed SDK roots instead of asking `xcrun`.
    pub fn with_sdk_roots(
        mut self,
        device: impl Into<PathBuf>,
        simulator: impl Into<PathBuf>,
    ) -> Self {
        self.device_sdk = Some(device.into());
        self.simulator_sdk = Some(simulator.into());
        self
    }

    fn sdk_root(&self, sdk: IosSdk) -> Result<PathBuf, BuildError> {
        let pinned = match sdk {
            IosSdk::Device => &self.device_sdk,
            IosSdk::Simulator => &self.simulator_sdk,
        };
        match pinned {
            Some(root) => Ok(root.clone()),
            None => apple_sdk_path(sdk.sdk_name()),
        }
    }

    /// Builds the overlay for `arch` against a known SDK root.
    pub fn overlay_with_sdk(&self, arch: &str, sdk_root: &Path) -> Result<Overlay, BuildError> {
        let sdk = IosSdk::for_arch(arch);
        let mut flags = format!("-arch {}", arch);
        if sdk == IosSdk::Device {
            // Thumb only exists on 32-bit ARM.
            if arch.starts_with("armv7") {
                flags.push_str(" -mthumb");
            }
            flags.push_str(" -fembed-bitcode");
        }
        flags.push_str(&format!(
            " {}={} -isysroot {}",
            sdk.version_min_flag(),
            self.settings.ios_deployment_target,
            sdk_root.display()
        ));

        let mut overlay = Overlay::new();
        overlay.host_triple = self.host_triple(arch)?;
        overlay
            .set("SDKROOT", sdk_root.display().to_string())
            .set("IPHONEOS_DEPLOYMENT_TARGET", self.settings.ios_deployment_target.clone())
            .set_flags("CFLAGS", &flags, &self.settings)
            .set_flags("CXXFLAGS", &flags, &self.settings)
            .set_flags("LDFLAGS", &flags, &self.settings);
        if let Some(cppflags) = self.settings.ambient_flag("CPPFLAGS") {
            overlay.set("CPPFLAGS", cppflags);
        }
        if sdk == IosSdk::Device {
            overlay.configure_args.push("--disable-shared".to_string());
        }
        Ok(overlay)
    }
}

impl Toolchain for IosToolchain {
    fn platform(&self) -> Platform {
        Platform::Ios
    }

    fn check_arch(&self, arch: &str) -> Result<(), BuildError> {
        if DEVICE_ARCHS.contains(&arch) || SIMULATOR_ARCHS.contains(&arch) {
            Ok(())
        } else {
            Err(BuildError::UnsupportedArch {
                platform: Platform::Ios,
                arch: arch.to_string(),
            })
        }
    }

    fn host_triple(&self, arch: &str) -> Result<Option<String>, BuildError> {
        self.check_arch(arch)?;
        Ok(Some(match IosSdk::for_arch(arch) {
            IosSdk::Device => "arm-apple-darwin".to_string(),
            IosSdk::Simulator => format!("{}-apple-darwin", arch),
        }))
    }

    fn overlay(&self, _prefix: &Prefix, arch: &str) -> Result<Overlay, BuildError> {
        self.check_arch(arch)?;
        let sdk_root = self.sdk_root(IosSdk::for_arch(arch))?;
        self.overlay_with_sdk(arch, &sdk_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolchain() -> IosToolchain {
        IosToolchain::new(Settings::default())
            .with_sdk_roots("/sdk/iPhoneOS.sdk", "/sdk/iPhoneSimulator.sdk")
    }

    #[test]
    fn classifies_arm_as_device() {
        assert_eq!(IosSdk::for_arch("armv7"), IosSdk::Device);
        assert_eq!(IosSdk::for_arch("arm64"), IosSdk::Device);
        assert_eq!(IosSdk::for_arch("x86_64"), IosSdk::Simulator);
        assert_eq!(IosSdk::for_arch("i386"), IosSdk::Simulator);
    }

    #[test]
    fn host_triples() {
        let tc = toolchain();
        assert_eq!(tc.host_triple("armv7").unwrap().as_deref(), Some("arm-apple-darwin"));
        assert_eq!(tc.host_triple("arm64").unwrap().as_deref(), Some("arm-apple-darwin"));
        assert_eq!(
            tc.host_triple("x86_64").unwrap().as_deref(),
            Some("x86_64-apple-darwin")
        );
        assert!(tc.host_triple("mips").is_err());
        assert!(tc.overlay_with_sdk("mips", Path::new("/s")).is_err());
    }

    #[test]
    fn device_overlay() {
        let overlay = toolchain().overlay(&Prefix::at("/unused"), "armv7").unwrap();
        let cflags = overlay.get("CFLAGS").unwrap();
        assert!(cflags.contains("-arch armv7"));
        assert!(cflags.contains("-mthumb"));
        assert!(cflags.contains("-fembed-bitcode"));
        assert!(cflags.contains("-miphoneos-version-min=8.0"));
        assert!(cflags.contains("-isysroot /sdk/iPhoneOS.sdk"));
        assert_eq!(overlay.configure_args, vec!["--disable-shared"]);
        assert_eq!(overlay.host_triple.as_deref(), Some("arm-apple-darwin"));
    }

    #[test]
    fn arm64_device_has_bitcode_without_thumb() {
        let overlay = toolchain().overlay(&Prefix::at("/unused"), "arm64").unwrap();
        let cflags = overlay.get("CFLAGS").unwrap();
        assert!(cflags.contains("-fembed-bitcode"));
        assert!(!cflags.contains("-mthumb"));
    }

    #[test]
    fn simulator_overlay() {
        let overlay = toolchain().overlay(&Prefix::at("/unused"), "x86_64").unwrap();
        let cflags = overlay.get("CFLAGS").unwrap();
        assert!(cflags.contains("-mios-simulator-version-min=8.0"));
        assert!(cflags.contains("-isysroot /sdk/iPhoneSimulator.sdk"));
        assert!(!cflags.contains("-mthumb"));
        assert!(!cflags.contains("-fembed-bitcode"));
        assert!(overlay.configure_args.is_empty());
        assert_eq!(overlay.get("SDKROOT"), Some("/sdk/iPhoneSimulator.sdk"));
    }

    #[test]
    fn deployment_target_from_settings() {
        let settings = Settings {
            ios_deployment_target: "12.0".to_string(),
            ..Settings::default()
        };
        let tc = IosToolchain::new(settings).with_sdk_roots("/d", "/s");
        let overlay = tc.overlay_with_sdk("i386", Path::new("/s")).unwrap();
        assert!(overlay.get("LDFLAGS").unwrap().contains("-mios-simulator-version-min=12.0"));
    }
}
