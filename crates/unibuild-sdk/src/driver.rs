//! Per-architecture build driver.
//!
//! For each architecture the driver asks the platform [`Toolchain`] for an
//! [`Overlay`], wraps it with the session in a [`Target`], and runs the
//! `target` hook. The overlay lives only as long as that call, and it reaches
//! subprocesses only through [`Target::command`].

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::Command;

use tracing::{info, info_span};

use crate::hooks::{Hooks, Session};
use crate::platforms::{Overlay, Toolchain};
use crate::types::BuildError;

/// One architecture's build context, passed to the per-architecture hooks.
pub struct Target<'a> {
    /// The run this architecture belongs to.
    pub session: &'a Session,
    /// Architecture name.
    pub arch: &'a str,
    /// Environment for this architecture's subprocesses.
    pub overlay: &'a Overlay,
}

impl<'a> Target<'a> {
    /// Wraps one architecture's overlay with the session it belongs to.
    pub fn new(session: &'a Session, arch: &'a str, overlay: &'a Overlay) -> Self {
        Self {
            session,
            arch,
            overlay,
        }
    }

    /// Install root for this architecture (`<prefix>/<arch>`).
    pub fn install_dir(&self) -> PathBuf {
        self.session.prefix.arch_dir(self.arch)
    }

    /// Creates a command that runs in the library source tree with the
    /// overlay applied.
    pub fn command(&self, program: impl AsRef<OsStr>) -> Result<Command, BuildError> {
        let mut cmd = Command::new(program);
        cmd.current_dir(&self.session.library.path);
        self.overlay.apply(&mut cmd)?;
        Ok(cmd)
    }

    /// `make` in the source tree with the overlay applied.
    pub fn make(&self) -> Result<Command, BuildError> {
        self.command("make")
    }

    /// Full configure argument list: `--host` when cross compiling, the
    /// install prefix, the toolchain's arguments, then `extra`.
    pub fn configure_args(&self, extra: &[String]) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(triple) = &self.overlay.host_triple {
            args.push(format!("--host={}", triple));
        }
        args.push(format!("--prefix={}", self.install_dir().display()));
        args.extend(self.overlay.configure_args.iter().cloned());
        args.extend(extra.iter().cloned());
        args
    }
}

/// Builds one architecture: computes its overlay, then runs the `target` hook.
pub fn build_arch(
    hooks: &Hooks,
    session: &Session,
    toolchain: &dyn Toolchain,
    arch: &str,
) -> Result<(), BuildError> {
    let _span = info_span!("arch", arch).entered();
    info!(library = %session.library.name, platform = %session.platform, "building architecture");

    let overlay = toolchain.overlay(&session.prefix, arch)?;
    let target = Target::new(session, arch, &overlay);
    hooks.target(&target)
}
