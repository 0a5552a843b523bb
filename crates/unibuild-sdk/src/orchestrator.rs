//! Top-level build lifecycle.
//!
//! An [`Orchestrator`] turns a [`BuildRequest`] into one of three outcomes:
//!
//! 1. `clean` requested: run `initialize` and `clean`, then stop.
//! 2. Success marker present: stop without doing anything.
//! 3. Otherwise: `prepare`, then `target` for each architecture in order,
//!    then `finalize` (which merges and writes the marker).
//!
//! The first error aborts the run. A failed run never leaves a success
//! marker behind, so the next invocation starts over from `prepare`.
//!
//! ## Example
//!
//! ```no_run
//! use unibuild_sdk::{BuildRequest, Orchestrator, Platform, PlatformSelection, Settings};
//!
//! let mut orchestrator = Orchestrator::new(Settings::new().with_process_env(), ".");
//! let outcome = orchestrator.run(
//!     &BuildRequest::new("libfoo").platform(PlatformSelection::Named(Platform::Android)),
//! )?;
//! println!("{:?}", outcome);
//! # Ok::<(), unibuild_sdk::BuildError>(())
//! ```

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, info_span};

use crate::driver::build_arch;
use crate::hooks::{Hooks, Session};
use crate::merge::Merger;
use crate::platforms::{Toolchain, toolchain_for};
use crate::settings::Settings;
use crate::types::{BuildError, BuildRequest, Library, Outcome, Platform, PlatformSelection};

/// Where a run currently is in the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildState {
    /// No run has happened yet.
    Unstarted,
    /// Required tools were found.
    Initialized,
    /// Terminal: clean path finished.
    Cleaned,
    /// Terminal: success marker found.
    AlreadyBuilt,
    /// The prefix was recreated and configure bootstrapped.
    Prepared,
    /// The named architecture was configured.
    Configured(String),
    /// The named architecture was compiled and installed.
    Built(String),
    /// Products were merged and the success marker written.
    Merged,
    /// Terminal: finalize finished.
    Finalized,
    /// Terminal: a step failed.
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildState::Unstarted => f.write_str("unstarted"),
            BuildState::Initialized => f.write_str("initialized"),
            BuildState::Cleaned => f.write_str("cleaned"),
            BuildState::AlreadyBuilt => f.write_str("already built"),
            BuildState::Prepared => f.write_str("prepared"),
            BuildState::Configured(arch) => write!(f, "configured {}", arch),
            BuildState::Built(arch) => write!(f, "built {}", arch),
            BuildState::Merged => f.write_str("merged"),
            BuildState::Finalized => f.write_str("finalized"),
            BuildState::Failed => f.write_str("failed"),
        }
    }
}

/// Runs the build lifecycle for one library at a time.
pub struct Orchestrator {
    settings: Settings,
    base_dir: PathBuf,
    hooks: Hooks,
    merger: Merger,
    toolchain: Option<Box<dyn Toolchain>>,
    history: Vec<BuildState>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("base_dir", &self.base_dir)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator that resolves library names against `base_dir`.
    pub fn new(settings: Settings, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            base_dir: base_dir.into(),
            hooks: Hooks::default(),
            merger: Merger::default(),
            toolchain: None,
            history: Vec::new(),
        }
    }

    /// Replaces the hook registry.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Replaces the artifact merger.
    pub fn merger(mut self, merger: Merger) -> Self {
        self.merger = merger;
        self
    }

    /// Uses `toolchain` instead of the platform's built-in one. Its
    /// platform must match the requested platform.
    pub fn toolchain(mut self, toolchain: Box<dyn Toolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// State reached by the most recent run.
    pub fn state(&self) -> BuildState {
        self.history.last().cloned().unwrap_or(BuildState::Unstarted)
    }

    /// Every state the most recent run passed through, in order.
    pub fn history(&self) -> &[BuildState] {
        &self.history
    }

    /// Runs one request to completion.
    pub fn run(&mut self, request: &BuildRequest) -> Result<Outcome, BuildError> {
        let mut history = Vec::new();
        let result = self.execute(request, &mut history);
        if let Err(err) = &result {
            debug!(error = %err, "run failed");
            history.push(BuildState::Failed);
        }
        self.history = history;
        result
    }

    fn execute(
        &self,
        request: &BuildRequest,
        history: &mut Vec<BuildState>,
    ) -> Result<Outcome, BuildError> {
        let library = Library::resolve(&self.base_dir, &request.library)?;
        let (platform, archs) = self.resolve_target(request)?;

        let fallback;
        let toolchain: &dyn Toolchain = match &self.toolchain {
            Some(toolchain) => toolchain.as_ref(),
            None => {
                fallback = toolchain_for(platform, &self.settings);
                fallback.as_ref()
            }
        };
        if toolchain.platform() != platform {
            return Err(BuildError::Settings(format!(
                "toolchain targets {} but {} was requested",
                toolchain.platform(),
                platform
            )));
        }

        let session = Session::new(library, platform, self.settings.clone(), self.merger.clone());
        let _span = info_span!(
            "unibuild",
            library = %session.library.name,
            platform = %platform
        )
        .entered();

        let result = self.lifecycle(&session, toolchain, &archs, request.clean);
        history.extend(session.history());
        result
    }

    fn lifecycle(
        &self,
        session: &Session,
        toolchain: &dyn Toolchain,
        archs: &[String],
        clean: bool,
    ) -> Result<Outcome, BuildError> {
        self.hooks.initialize(session)?;
        session.record(BuildState::Initialized);

        if clean {
            self.hooks.clean(session)?;
            session.record(BuildState::Cleaned);
            info!(prefix = %session.prefix.root().display(), "cleaned");
            return Ok(Outcome::Cleaned {
                prefix: session.prefix.root().to_path_buf(),
            });
        }

        if session.prefix.is_built() {
            info!(out = %session.prefix.out_dir().display(), "already built, nothing to do");
            session.record(BuildState::AlreadyBuilt);
            return Ok(Outcome::AlreadyBuilt {
                out_dir: session.prefix.out_dir(),
            });
        }

        for arch in archs {
            toolchain.check_arch(arch)?;
        }

        self.hooks.prepare(session, archs)?;
        session.record(BuildState::Prepared);

        for arch in archs {
            build_arch(&self.hooks, session, toolchain, arch)?;
        }

        self.hooks.finalize(session, archs)?;
        session.record(BuildState::Finalized);
        info!(out = %session.prefix.out_dir().display(), "build complete");
        Ok(Outcome::Built {
            out_dir: session.prefix.out_dir(),
        })
    }

    /// Resolves the platform and architecture list for `request`.
    ///
    /// An explicit list wins. A host build defaults to the host architecture
    /// only; a named platform defaults to its configured list.
    fn resolve_target(&self, request: &BuildRequest) -> Result<(Platform, Vec<String>), BuildError> {
        let (platform, host_arch) = match request.platform {
            PlatformSelection::Host => {
                let (platform, arch) = Platform::host()?;
                (platform, Some(arch))
            }
            PlatformSelection::Named(platform) => (platform, None),
        };

        let archs = match (&request.archs, host_arch) {
            (Some(archs), _) => archs.clone(),
            (None, Some(arch)) => vec![arch],
            (None, None) => self.settings.default_archs(platform),
        };
        if archs.is_empty() {
            return Err(BuildError::Settings(format!(
                "no architectures to build for {}",
                platform
            )));
        }
        Ok((platform, archs))
    }
}
