//! # unibuild
//!
//! Command-line tool for building autotools C/C++ libraries for macOS, iOS
//! and Android.
//!
//! ## Overview
//!
//! `unibuild` is the CLI front end of [`unibuild_sdk`]. For one library it:
//!
//! - **Checks** that the required build tools are installed
//! - **Builds** the library once per architecture with the platform's toolchain
//! - **Merges** the results into fat binaries (Apple) or `lib/<abi>/` (Android)
//!
//! ## Usage
//!
//! ```bash
//! # Build libfoo for the host platform (macOS, native architecture)
//! unibuild libfoo
//!
//! # Build for Android, two architectures only
//! unibuild libfoo android --arch arm,arm64
//!
//! # Remove the iOS build prefix and clean the source tree
//! unibuild libfoo ios clean
//! ```
//!
//! `LIBRARY` is a directory relative to the current directory. Products are
//! written to `LIBRARY/build-<platform>~/out/`. A finished build is not
//! repeated until it is cleaned.
//!
//! ## Output Directory
//!
//! ```text
//! libfoo/build-android~/
//! ├── arm/ arm64/        # per-architecture install roots
//! ├── toolchains/        # NDK standalone toolchains
//! └── out/
//!     ├── include/
//!     ├── lib/armeabi-v7a/libfoo.so
//!     ├── lib/arm64-v8a/libfoo.so
//!     └── .success
//! ```
//!
//! ## Configuration
//!
//! Settings come from, in increasing priority: built-in defaults,
//! `unibuild.toml` (see [`config`]), the environment (including a `.env.local`
//! file in the current directory), and command-line flags.
//!
//! ```bash
//! export ANDROID_NDK_ROOT="$HOME/Library/Android/sdk/ndk/19.2.5345600"
//! export MACOSX_DEPLOYMENT_TARGET=10.13
//! ```
//!
//! ## CLI Flags
//!
//! - **`--arch`** - Architectures to build (repeatable or comma-separated)
//! - **`--jobs` / `-j`** - Parallel make jobs
//! - **`--configure-arg`** - Extra configure argument (repeatable)
//! - **`--config`** - Config file to use instead of discovering one
//! - **`--verbose` / `-v`** - Enable debug logging
//!
//! ## Modules
//!
//! - [`config`] - Configuration file support for `unibuild.toml`

#![cfg_attr(docsrs, feature(doc_cfg))]

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use unibuild_sdk::{BuildRequest, Orchestrator, Outcome, PlatformSelection, Settings};

pub mod config;

use config::ConfigResolver;

/// Token that selects the clean path when it is the last positional argument.
const CLEAN_DIRECTIVE: &str = "clean";

/// Build an autotools library per architecture and merge the results.
#[derive(Parser, Debug)]
#[command(name = "unibuild", author, version, about = "Cross-platform native library builder", long_about = None)]
struct Cli {
    /// Library source directory, relative to the current directory
    library: String,

    /// Platform (host, macos, ios, android), optionally followed by `clean`
    #[arg(value_name = "PLATFORM")]
    rest: Vec<String>,

    /// Architectures to build instead of the platform default
    #[arg(long = "arch", value_delimiter = ',')]
    archs: Vec<String>,

    /// Parallel make jobs (default: CPU count)
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Extra argument passed to every configure invocation
    #[arg(long = "configure-arg", allow_hyphen_values = true)]
    configure_args: Vec<String>,

    /// Path to a config file (default: discover unibuild.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    /// Turns the positional arguments and `--arch` into a build request.
    fn request(&self) -> Result<BuildRequest> {
        let mut rest: &[String] = &self.rest;
        let clean = rest.last().is_some_and(|t| t == CLEAN_DIRECTIVE);
        if clean {
            rest = &rest[..rest.len() - 1];
        }

        let platform = match rest {
            [] => PlatformSelection::Host,
            [name] => PlatformSelection::parse(name)?,
            [_, extra, ..] => bail!(
                "unexpected argument '{}'. Usage: unibuild <LIBRARY> [PLATFORM] [clean]",
                extra
            ),
        };

        let mut request = BuildRequest::new(self.library.clone())
            .platform(platform)
            .clean(clean);
        let archs: Vec<String> = self
            .archs
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if !archs.is_empty() {
            request = request.archs(archs);
        }
        Ok(request)
    }

    /// Applies command-line overrides on top of file and environment settings.
    fn apply_overrides(&self, mut settings: Settings) -> Settings {
        if let Some(jobs) = self.jobs {
            settings.jobs = Some(jobs);
        }
        settings
            .configure_args
            .extend(self.configure_args.iter().cloned());
        settings
    }
}

pub fn run() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = env::current_dir().context("resolving current directory")?;
    let request = cli.request()?;

    let resolver = ConfigResolver::new(cli.config.as_deref(), &cwd)?;
    if let Some(path) = &resolver.config_path {
        debug!(config = %path.display(), "loaded configuration");
    }
    let settings = cli.apply_overrides(resolver.settings(|key| env::var(key).ok()));
    debug!(?settings, "resolved settings");

    let mut orchestrator = Orchestrator::new(settings, &cwd);
    let outcome = orchestrator
        .run(&request)
        .with_context(|| format!("unibuild failed for '{}'", request.library))?;
    println!("{}", describe(&outcome, &cwd));
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn load_dotenv() {
    if let Ok(cwd) = env::current_dir() {
        let _ = dotenvy::from_path(cwd.join(".env.local"));
    }
}

fn describe(outcome: &Outcome, cwd: &Path) -> String {
    let short = |path: &Path| path.strip_prefix(cwd).unwrap_or(path).display().to_string();
    match outcome {
        Outcome::Built { out_dir } => format!("Built: {}", short(out_dir)),
        Outcome::AlreadyBuilt { out_dir } => format!("Already built: {}", short(out_dir)),
        Outcome::Cleaned { prefix } => format!("Cleaned: {}", short(prefix)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unibuild_sdk::Platform;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("unibuild").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn library_only_builds_host() {
        let request = parse(&["libfoo"]).request().unwrap();
        assert_eq!(request.library, "libfoo");
        assert_eq!(request.platform, PlatformSelection::Host);
        assert!(!request.clean);
        assert!(request.archs.is_none());
    }

    #[test]
    fn named_platform() {
        let request = parse(&["libfoo", "android"]).request().unwrap();
        assert_eq!(request.platform, PlatformSelection::Named(Platform::Android));
        assert!(!request.clean);
    }

    #[test]
    fn trailing_clean_directive() {
        let request = parse(&["libfoo", "ios", "clean"]).request().unwrap();
        assert_eq!(request.platform, PlatformSelection::Named(Platform::Ios));
        assert!(request.clean);

        let request = parse(&["libfoo", "clean"]).request().unwrap();
        assert_eq!(request.platform, PlatformSelection::Host);
        assert!(request.clean);
    }

    #[test]
    fn unknown_platform_is_rejected() {
        let err = parse(&["libfoo", "windows"]).request().unwrap_err();
        assert!(err.to_string().contains("windows"));
    }

    #[test]
    fn extra_positional_is_rejected() {
        assert!(parse(&["libfoo", "android", "ios"]).request().is_err());
        assert!(parse(&["libfoo", "android", "ios", "clean"]).request().is_err());
    }

    #[test]
    fn arch_flag_accepts_lists_and_repeats() {
        let request = parse(&["libfoo", "android", "--arch", "arm,arm64", "--arch", "x86"])
            .request()
            .unwrap();
        assert_eq!(
            request.archs,
            Some(vec!["arm".to_string(), "arm64".to_string(), "x86".to_string()])
        );
    }

    #[test]
    fn overrides_win_over_settings() {
        let cli = parse(&[
            "libfoo",
            "--jobs",
            "2",
            "--configure-arg",
            "--disable-docs",
        ]);
        let base = Settings {
            jobs: Some(16),
            configure_args: vec!["--enable-static".to_string()],
            ..Settings::default()
        };
        let settings = cli.apply_overrides(base);
        assert_eq!(settings.jobs, Some(2));
        assert_eq!(settings.configure_args, vec!["--enable-static", "--disable-docs"]);
    }

    #[test]
    fn describes_outcomes_relative_to_cwd() {
        let cwd = Path::new("/work");
        let built = Outcome::Built {
            out_dir: PathBuf::from("/work/libfoo/build-android~/out"),
        };
        assert_eq!(describe(&built, cwd), "Built: libfoo/build-android~/out");

        let cleaned = Outcome::Cleaned {
            prefix: PathBuf::from("/elsewhere/build-ios~"),
        };
        assert_eq!(describe(&cleaned, cwd), "Cleaned: /elsewhere/build-ios~");
    }
}
