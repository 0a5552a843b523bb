//! Overridable lifecycle hooks.
//!
//! The lifecycle is a fixed tree of named steps:
//!
//! ```text
//! initialize ── initialize_needs
//! clean
//! prepare ───── prepare_clean, prepare_config
//! target ────── target_prepare, target_configure, target_build   (per arch)
//! finalize ──── finalize_merge, finalize_clean
//! ```
//!
//! [`Hooks`] holds one function value per step. [`Hooks::default`] wires every
//! step to the matching function in [`defaults`]. An override replaces a slot
//! and receives the registry itself, so it can call the stored default (or
//! any other hook) instead of copying it:
//!
//! ```no_run
//! use unibuild_sdk::hooks::{Hooks, defaults};
//!
//! let hooks = Hooks::default().with_target_configure(|hooks, target, extra| {
//!     let mut args = extra.to_vec();
//!     args.push("--without-docs".to_string());
//!     defaults::target_configure(hooks, target, &args)
//! });
//! ```
//!
//! Hooks keep no state between calls. Everything they need arrives through
//! the [`Session`] (library, platform, prefix, settings, merger) and, for
//! per-architecture steps, the [`Target`].

use std::cell::RefCell;
use std::fmt;
use std::process::Command;
use std::rc::Rc;

use tracing::{debug, info, info_span};

use crate::common::{make, probe, run_command};
use crate::driver::Target;
use crate::merge::Merger;
use crate::orchestrator::BuildState;
use crate::settings::Settings;
use crate::tools::{locate, missing_tools};
use crate::types::{BuildError, Library, Platform};
use crate::workspace::Prefix;

/// Context shared by every hook in one orchestrator run.
///
/// Everything except the recorded state history is read-only once the run
/// starts.
pub struct Session {
    /// The library being built.
    pub library: Library,
    /// Target platform.
    pub platform: Platform,
    /// Build prefix for (library, platform).
    pub prefix: Prefix,
    /// Resolved settings.
    pub settings: Settings,
    /// Artifact merger used by `finalize_merge`.
    pub merger: Merger,
    history: RefCell<Vec<BuildState>>,
}

impl Session {
    /// Creates a session for `library` with its prefix under the library.
    pub fn new(library: Library, platform: Platform, settings: Settings, merger: Merger) -> Self {
        Self {
            prefix: Prefix::for_library(&library, platform),
            library,
            platform,
            settings,
            merger,
            history: RefCell::new(Vec::new()),
        }
    }

    /// Records a lifecycle state transition.
    pub fn record(&self, state: BuildState) {
        debug!(state = %state, "lifecycle");
        self.history.borrow_mut().push(state);
    }

    /// States recorded so far, in order.
    pub fn history(&self) -> Vec<BuildState> {
        self.history.borrow().clone()
    }

    /// Whether the source tree has a generated Makefile.
    pub fn has_build_metadata(&self) -> bool {
        self.library.path.join("Makefile").is_file()
    }

    /// Whether the source tree already has a configure script.
    pub fn has_configure_script(&self) -> bool {
        self.library.path.join("configure").is_file()
    }
}

/// Hook taking only the session.
pub type SessionHook = Rc<dyn Fn(&Hooks, &Session) -> Result<(), BuildError>>;
/// Hook taking the session and the architecture list.
pub type ArchsHook = Rc<dyn Fn(&Hooks, &Session, &[String]) -> Result<(), BuildError>>;
/// Hook running for one architecture.
pub type TargetHook = Rc<dyn Fn(&Hooks, &Target<'_>) -> Result<(), BuildError>>;
/// Configure hook: one architecture plus extra configure arguments.
pub type ConfigureHook = Rc<dyn Fn(&Hooks, &Target<'_>, &[String]) -> Result<(), BuildError>>;

/// Names of the lifecycle hooks, used for tracing spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    /// Checks the environment before anything else runs.
    Initialize,
    /// Verifies required tools are installed.
    InitializeNeeds,
    /// Removes the prefix and cleans the source tree.
    Clean,
    /// Readies the prefix and source tree for the first architecture.
    Prepare,
    /// Recreates the prefix.
    PrepareClean,
    /// Bootstraps the configure script.
    PrepareConfig,
    /// Builds one architecture.
    Target,
    /// Cleans leftovers of the previous architecture.
    TargetPrepare,
    /// Runs configure for one architecture.
    TargetConfigure,
    /// Compiles and installs one architecture.
    TargetBuild,
    /// Produces the final bundle.
    Finalize,
    /// Merges install roots and writes the success marker.
    FinalizeMerge,
    /// Cleans the source tree after merging.
    FinalizeClean,
}

impl HookName {
    /// Snake-case hook name.
    pub fn as_str(&self) -> &'static str {
        match self {
            HookName::Initialize => "initialize",
            HookName::InitializeNeeds => "initialize_needs",
            HookName::Clean => "clean",
            HookName::Prepare => "prepare",
            HookName::PrepareClean => "prepare_clean",
            HookName::PrepareConfig => "prepare_config",
            HookName::Target => "target",
            HookName::TargetPrepare => "target_prepare",
            HookName::TargetConfigure => "target_configure",
            HookName::TargetBuild => "target_build",
            HookName::Finalize => "finalize",
            HookName::FinalizeMerge => "finalize_merge",
            HookName::FinalizeClean => "finalize_clean",
        }
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hook registry.
#[derive(Clone)]
pub struct Hooks {
    initialize: SessionHook,
    initialize_needs: SessionHook,
    clean: SessionHook,
    prepare: ArchsHook,
    prepare_clean: SessionHook,
    prepare_config: SessionHook,
    target: TargetHook,
    target_prepare: TargetHook,
    target_configure: ConfigureHook,
    target_build: TargetHook,
    finalize: ArchsHook,
    finalize_merge: ArchsHook,
    finalize_clean: SessionHook,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            initialize: Rc::new(defaults::initialize),
            initialize_needs: Rc::new(defaults::initialize_needs),
            clean: Rc::new(defaults::clean),
            prepare: Rc::new(defaults::prepare),
            prepare_clean: Rc::new(defaults::prepare_clean),
            prepare_config: Rc::new(defaults::prepare_config),
            target: Rc::new(defaults::target),
            target_prepare: Rc::new(defaults::target_prepare),
            target_configure: Rc::new(defaults::target_configure),
            target_build: Rc::new(defaults::target_build),
            finalize: Rc::new(defaults::finalize),
            finalize_merge: Rc::new(defaults::finalize_merge),
            finalize_clean: Rc::new(defaults::finalize_clean),
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks").finish_non_exhaustive()
    }
}

macro_rules! session_hook {
    ($name:ident, $setter:ident, $hook:expr) => {
        #[doc = concat!("Runs the `", stringify!($name), "` hook.")]
        pub fn $name(&self, session: &Session) -> Result<(), BuildError> {
            let _span = info_span!("hook", name = %$hook).entered();
            (self.$name)(self, session)
        }

        #[doc = concat!("Overrides the `", stringify!($name), "` hook.")]
        pub fn $setter<F>(mut self, hook: F) -> Self
        where
            F: Fn(&Hooks, &Session) -> Result<(), BuildError> + 'static,
        {
            self.$name = Rc::new(hook);
            self
        }
    };
}

macro_rules! archs_hook {
    ($name:ident, $setter:ident, $hook:expr) => {
        #[doc = concat!("Runs the `", stringify!($name), "` hook.")]
        pub fn $name(&self, session: &Session, archs: &[String]) -> Result<(), BuildError> {
            let _span = info_span!("hook", name = %$hook).entered();
            (self.$name)(self, session, archs)
        }

        #[doc = concat!("Overrides the `", stringify!($name), "` hook.")]
        pub fn $setter<F>(mut self, hook: F) -> Self
        where
            F: Fn(&Hooks, &Session, &[String]) -> Result<(), BuildError> + 'static,
        {
            self.$name = Rc::new(hook);
            self
        }
    };
}

macro_rules! target_hook {
    ($name:ident, $setter:ident, $hook:expr) => {
        #[doc = concat!("Runs the `", stringify!($name), "` hook.")]
        pub fn $name(&self, target: &Target<'_>) -> Result<(), BuildError> {
            let _span = info_span!("hook", name = %$hook).entered();
            (self.$name)(self, target)
        }

        #[doc = concat!("Overrides the `", stringify!($name), "` hook.")]
        pub fn $setter<F>(mut self, hook: F) -> Self
        where
            F: Fn(&Hooks, &Target<'_>) -> Result<(), BuildError> + 'static,
        {
            self.$name = Rc::new(hook);
            self
        }
    };
}

impl Hooks {
    /// Registry with every hook set to its default.
    pub fn new() -> Self {
        Self::default()
    }

    session_hook!(initialize, with_initialize, HookName::Initialize);
    session_hook!(initialize_needs, with_initialize_needs, HookName::InitializeNeeds);
    session_hook!(clean, with_clean, HookName::Clean);
    archs_hook!(prepare, with_prepare, HookName::Prepare);
    session_hook!(prepare_clean, with_prepare_clean, HookName::PrepareClean);
    session_hook!(prepare_config, with_prepare_config, HookName::PrepareConfig);
    target_hook!(target, with_target, HookName::Target);
    target_hook!(target_prepare, with_target_prepare, HookName::TargetPrepare);
    archs_hook!(finalize, with_finalize, HookName::Finalize);
    session_hook!(finalize_clean, with_finalize_clean, HookName::FinalizeClean);

    /// Runs the `target_configure` hook with extra configure arguments.
    pub fn target_configure(&self, target: &Target<'_>, extra: &[String]) -> Result<(), BuildError> {
        let _span = info_span!("hook", name = %HookName::TargetConfigure).entered();
        (self.target_configure)(self, target, extra)?;
        target
            .session
            .record(BuildState::Configured(target.arch.to_string()));
        Ok(())
    }

    /// Overrides the `target_configure` hook.
    pub fn with_target_configure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Hooks, &Target<'_>, &[String]) -> Result<(), BuildError> + 'static,
    {
        self.target_configure = Rc::new(hook);
        self
    }

    /// Runs the `target_build` hook.
    pub fn target_build(&self, target: &Target<'_>) -> Result<(), BuildError> {
        let _span = info_span!("hook", name = %HookName::TargetBuild).entered();
        (self.target_build)(self, target)?;
        target
            .session
            .record(BuildState::Built(target.arch.to_string()));
        Ok(())
    }

    /// Overrides the `target_build` hook.
    pub fn with_target_build<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Hooks, &Target<'_>) -> Result<(), BuildError> + 'static,
    {
        self.target_build = Rc::new(hook);
        self
    }

    /// Runs the `finalize_merge` hook.
    pub fn finalize_merge(&self, session: &Session, archs: &[String]) -> Result<(), BuildError> {
        let _span = info_span!("hook", name = %HookName::FinalizeMerge).entered();
        (self.finalize_merge)(self, session, archs)?;
        session.record(BuildState::Merged);
        Ok(())
    }

    /// Overrides the `finalize_merge` hook.
    pub fn with_finalize_merge<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Hooks, &Session, &[String]) -> Result<(), BuildError> + 'static,
    {
        self.finalize_merge = Rc::new(hook);
        self
    }
}

/// Default hook implementations.
///
/// Each function has the signature of its hook slot and can be called
/// directly from an override.
pub mod defaults {
    use super::*;

    /// Checks that the tools in `settings.required_tools` are installed.
    pub fn initialize(hooks: &Hooks, session: &Session) -> Result<(), BuildError> {
        hooks.initialize_needs(session)
    }

    /// Fails with [`BuildError::MissingTools`] if any required tool is missing.
    pub fn initialize_needs(_hooks: &Hooks, session: &Session) -> Result<(), BuildError> {
        let missing = missing_tools(&session.settings.required_tools);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BuildError::MissingTools(missing))
        }
    }

    /// Removes the prefix, runs `make distclean` if the tree was configured,
    /// and removes untracked and ignored files if the tree is a git checkout.
    pub fn clean(_hooks: &Hooks, session: &Session) -> Result<(), BuildError> {
        session.prefix.destroy()?;

        if session.has_build_metadata() {
            info!(library = %session.library.name, "running make distclean");
            let mut cmd = make(&session.library.path);
            cmd.arg("distclean");
            run_command(cmd, "make distclean", BuildError::Clean)?;
        } else {
            debug!("no Makefile, skipping distclean");
        }

        if is_git_checkout(session) {
            info!(library = %session.library.name, "removing untracked and ignored files");
            let mut cmd = Command::new("git");
            cmd.args(["clean", "-x", "-d", "-f", "-q", "--", "."])
                .current_dir(&session.library.path);
            run_command(cmd, "git clean", BuildError::Clean)?;
        }
        Ok(())
    }

    /// Runs `prepare_clean` then `prepare_config`.
    pub fn prepare(hooks: &Hooks, session: &Session, _archs: &[String]) -> Result<(), BuildError> {
        hooks.prepare_clean(session)?;
        hooks.prepare_config(session)
    }

    /// Removes and recreates the prefix.
    pub fn prepare_clean(_hooks: &Hooks, session: &Session) -> Result<(), BuildError> {
        session.prefix.recreate()
    }

    /// Generates `configure` with `autoreconf` unless it already exists.
    pub fn prepare_config(_hooks: &Hooks, session: &Session) -> Result<(), BuildError> {
        if session.has_configure_script() {
            debug!("configure script present, skipping autoreconf");
            return Ok(());
        }
        info!(library = %session.library.name, "bootstrapping configure script");
        let mut cmd = Command::new("autoreconf");
        cmd.args(["--install", "--force"])
            .current_dir(&session.library.path);
        run_command(cmd, "autoreconf", BuildError::Configure)
    }

    /// Runs `target_prepare`, `target_configure` and `target_build` for one
    /// architecture, passing the configured extra configure arguments.
    pub fn target(hooks: &Hooks, target: &Target<'_>) -> Result<(), BuildError> {
        hooks.target_prepare(target)?;
        hooks.target_configure(target, &target.session.settings.configure_args)?;
        hooks.target_build(target)
    }

    /// Runs `make clean` if a previous configure left a Makefile behind.
    pub fn target_prepare(_hooks: &Hooks, target: &Target<'_>) -> Result<(), BuildError> {
        if !target.session.has_build_metadata() {
            return Ok(());
        }
        let mut cmd = target.make()?;
        cmd.arg("clean");
        run_command(cmd, &format!("make clean ({})", target.arch), BuildError::Build)
    }

    /// Runs `configure --host=<triple> --prefix=<prefix>/<arch>` followed by
    /// the toolchain's configure arguments and `extra`.
    pub fn target_configure(
        _hooks: &Hooks,
        target: &Target<'_>,
        extra: &[String],
    ) -> Result<(), BuildError> {
        let mut cmd = target.command(target.session.library.path.join("configure"))?;
        cmd.args(target.configure_args(extra));
        info!(arch = target.arch, "configuring");
        run_command(cmd, &format!("configure ({})", target.arch), BuildError::Configure)
    }

    /// Compiles with one job per CPU and installs into the architecture's
    /// install root.
    pub fn target_build(_hooks: &Hooks, target: &Target<'_>) -> Result<(), BuildError> {
        let jobs = target.session.settings.parallelism();
        info!(arch = target.arch, jobs, "building");

        let mut cmd = target.make()?;
        cmd.arg(format!("-j{}", jobs)).args(&target.overlay.make_args);
        run_command(cmd, &format!("make ({})", target.arch), BuildError::Build)?;

        let mut cmd = target.make()?;
        cmd.arg("install").args(&target.overlay.make_args);
        run_command(cmd, &format!("make install ({})", target.arch), BuildError::Build)
    }

    /// Runs `finalize_merge` then `finalize_clean`.
    pub fn finalize(hooks: &Hooks, session: &Session, archs: &[String]) -> Result<(), BuildError> {
        hooks.finalize_merge(session, archs)?;
        hooks.finalize_clean(session)
    }

    /// Merges the per-architecture install roots into `out/`.
    pub fn finalize_merge(
        _hooks: &Hooks,
        session: &Session,
        archs: &[String],
    ) -> Result<(), BuildError> {
        session
            .merger
            .merge(&session.prefix, session.platform, &session.library.name, archs)
    }

    /// Runs `make clean` in the source tree if it is configured.
    pub fn finalize_clean(_hooks: &Hooks, session: &Session) -> Result<(), BuildError> {
        if !session.has_build_metadata() {
            return Ok(());
        }
        let mut cmd = make(&session.library.path);
        cmd.arg("clean");
        run_command(cmd, "make clean", BuildError::Clean)
    }

    pub(super) fn is_git_checkout(session: &Session) -> bool {
        if locate("git").is_none() {
            return false;
        }
        let mut cmd = Command::new("git");
        cmd.args(["rev-parse", "--is-inside-work-tree"])
            .current_dir(&session.library.path);
        probe(cmd)
    }
}
