//! Cross-platform native library build engine
//!
//! `unibuild-sdk` builds an autotools-based C/C++ library once per CPU
//! architecture for macOS, iOS or Android, then merges the results into a
//! single distributable bundle: fat binaries for Apple platforms, one
//! `lib/<abi>/` directory per architecture for Android.
//!
//! # Quick Start
//!
//! 1. Add unibuild-sdk to your project:
//! ```toml
//! [dependencies]
//! unibuild-sdk = "0.1"
//! ```
//!
//! 2. Build a library that lives next to your working directory:
//! ```no_run
//! use unibuild_sdk::{BuildRequest, Orchestrator, Platform, PlatformSelection, Settings};
//!
//! fn main() -> Result<(), unibuild_sdk::BuildError> {
//!     let settings = Settings::new().with_process_env();
//!     let mut orchestrator = Orchestrator::new(settings, ".");
//!
//!     let request = BuildRequest::new("libfoo")
//!         .platform(PlatformSelection::Named(Platform::Android))
//!         .archs(vec!["arm".into(), "arm64".into()]);
//!     let outcome = orchestrator.run(&request)?;
//!
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```
//!
//! Products land in `libfoo/build-android~/out/`. Running the same request
//! again is a no-op until the prefix is cleaned with `.clean(true)`.
//!
//! # Architecture
//!
//! The SDK consists of several components:
//!
//! - **Tools**: Checks that required executables are on `PATH`
//! - **Workspace**: Prefix layout and the `out/.success` marker
//! - **Hooks**: The overridable lifecycle steps and their defaults
//! - **Platforms**: Per-architecture compiler environments for each platform
//! - **Driver**: Runs the per-architecture hooks with that environment
//! - **Merge**: Combines install roots into `out/`
//! - **Orchestrator**: Sequences the lifecycle and decides skip or clean
//!
//! # Customizing a step
//!
//! Hooks are replaced one at a time. An override can still call the default:
//!
//! ```no_run
//! use unibuild_sdk::hooks::{Hooks, defaults};
//! use unibuild_sdk::{Orchestrator, Settings};
//!
//! let hooks = Hooks::default().with_prepare_config(|hooks, session| {
//!     std::fs::write(session.library.path.join("VERSION"), "1.0\n")?;
//!     defaults::prepare_config(hooks, session)
//! });
//! let orchestrator = Orchestrator::new(Settings::new(), ".").hooks(hooks);
//! ```

// Public modules
pub mod common;
pub mod driver;
pub mod hooks;
pub mod merge;
pub mod orchestrator;
pub mod platforms;
pub mod settings;
pub mod tools;
pub mod types;
pub mod workspace;

// Re-export key types for convenience
pub use driver::Target;
pub use hooks::{HookName, Hooks, Session};
pub use merge::{BinaryCombiner, Lipo, Merger};
pub use orchestrator::{BuildState, Orchestrator};
pub use platforms::{Overlay, Toolchain, toolchain_for};
pub use settings::Settings;
pub use tools::check_tools;
pub use types::{
    BuildError, BuildRequest, Library, MergeLayout, Outcome, Platform, PlatformSelection,
};
pub use workspace::{Prefix, SuccessRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
