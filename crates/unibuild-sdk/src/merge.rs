//! Merging per-architecture install roots into one distributable bundle.
//!
//! Apple platforms get fat binaries: every combinable file in the first
//! architecture's `lib/` is joined with the same-named files from the other
//! architectures. Android keeps architectures apart and copies each one's
//! shared objects into `out/lib/<abi>/`. In both cases headers are taken from
//! the first architecture, and the success marker is written last.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::common::{capture_stdout, probe};
use crate::types::{BuildError, MergeLayout, Platform};
use crate::workspace::{Prefix, SuccessRecord};

/// Combines same-named binaries for several architectures into one file.
pub trait BinaryCombiner {
    /// Whether `path` is a binary the combiner understands.
    fn is_combinable(&self, path: &Path) -> bool;

    /// Writes a single multi-architecture file at `output`.
    fn combine(&self, inputs: &[PathBuf], output: &Path) -> Result<(), BuildError>;
}

/// [`BinaryCombiner`] backed by Apple's `lipo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lipo;

impl BinaryCombiner for Lipo {
    fn is_combinable(&self, path: &Path) -> bool {
        let mut cmd = Command::new("lipo");
        cmd.arg("-info").arg(path);
        probe(cmd)
    }

    fn combine(&self, inputs: &[PathBuf], output: &Path) -> Result<(), BuildError> {
        let mut cmd = Command::new("lipo");
        cmd.arg("-create").args(inputs).arg("-output").arg(output);
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        capture_stdout(cmd, &format!("lipo -create for {}", name), BuildError::Merge)?;
        Ok(())
    }
}

/// Android ABI directory name for an NDK architecture.
pub fn android_abi(arch: &str) -> &str {
    match arch {
        "arm" => "armeabi-v7a",
        "arm64" => "arm64-v8a",
        other => other,
    }
}

/// Merges install roots under a prefix into `<prefix>/out`.
#[derive(Clone)]
pub struct Merger {
    combiner: Rc<dyn BinaryCombiner>,
}

impl Default for Merger {
    fn default() -> Self {
        Self::new(Lipo)
    }
}

impl std::fmt::Debug for Merger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merger").finish_non_exhaustive()
    }
}

impl Merger {
    /// Creates a merger using `combiner` for fat binaries.
    pub fn new(combiner: impl BinaryCombiner + 'static) -> Self {
        Self {
            combiner: Rc::new(combiner),
        }
    }

    /// Merges every architecture in `archs` and writes the success marker.
    ///
    /// Each architecture must already have an install root under the prefix.
    /// On error the marker is not written.
    pub fn merge(
        &self,
        prefix: &Prefix,
        platform: Platform,
        library: &str,
        archs: &[String],
    ) -> Result<(), BuildError> {
        let first = archs
            .first()
            .ok_or_else(|| BuildError::Merge("no architectures to merge".to_string()))?;
        for arch in archs {
            let dir = prefix.arch_dir(arch);
            if !dir.is_dir() {
                return Err(BuildError::Merge(format!(
                    "install root for {} is missing: {}",
                    arch,
                    dir.display()
                )));
            }
        }

        fs::create_dir_all(prefix.out_dir())?;
        self.merge_headers(prefix, first)?;
        match platform.merge_layout() {
            MergeLayout::Fat => self.merge_fat(prefix, archs)?,
            MergeLayout::PerAbi => self.merge_per_abi(prefix, archs)?,
        }

        prefix.mark_success(&SuccessRecord::now(library, platform, archs))?;
        info!(out = %prefix.out_dir().display(), archs = archs.len(), "merged");
        Ok(())
    }

    fn merge_headers(&self, prefix: &Prefix, first: &str) -> Result<(), BuildError> {
        let src = prefix.arch_dir(first).join("include");
        if !src.is_dir() {
            warn!(arch = first, "no include directory to publish");
            return Ok(());
        }
        let dest = prefix.out_include();
        if dest.exists() {
            fs::remove_dir_all(&dest)?;
        }
        fs::rename(&src, &dest).map_err(|e| {
            BuildError::Merge(format!(
                "Failed to move headers {} -> {}: {}",
                src.display(),
                dest.display(),
                e
            ))
        })
    }

    fn merge_fat(&self, prefix: &Prefix, archs: &[String]) -> Result<(), BuildError> {
        let first_lib = prefix.arch_dir(&archs[0]).join("lib");
        let out_lib = prefix.out_lib();
        fs::create_dir_all(&out_lib)?;

        let files = if first_lib.is_dir() {
            sorted_files(&first_lib)?
        } else {
            debug!(dir = %first_lib.display(), "no library directory, nothing to combine");
            Vec::new()
        };
        for path in files {
            if !self.combiner.is_combinable(&path) {
                debug!(file = %path.display(), "not a combinable binary, skipping");
                continue;
            }
            let Some(name) = path.file_name() else {
                continue;
            };
            let mut inputs = Vec::with_capacity(archs.len());
            for arch in archs {
                let input = prefix.arch_dir(arch).join("lib").join(name);
                if !input.is_file() {
                    return Err(BuildError::Merge(format!(
                        "{} has no {} to combine",
                        arch,
                        name.to_string_lossy()
                    )));
                }
                inputs.push(input);
            }
            debug!(file = %name.to_string_lossy(), "combining");
            self.combiner.combine(&inputs, &out_lib.join(name))?;
        }
        Ok(())
    }

    fn merge_per_abi(&self, prefix: &Prefix, archs: &[String]) -> Result<(), BuildError> {
        for arch in archs {
            let src = prefix.arch_dir(arch).join("lib");
            let objects: Vec<PathBuf> = sorted_files(&src)?
                .into_iter()
                .filter(|p| p.extension().is_some_and(|ext| ext == "so"))
                .collect();
            if objects.is_empty() {
                return Err(BuildError::Merge(format!(
                    "{} produced no shared objects in {}",
                    arch,
                    src.display()
                )));
            }

            let dest = prefix.out_lib().join(android_abi(arch));
            fs::create_dir_all(&dest)?;
            for object in objects {
                let Some(name) = object.file_name() else {
                    continue;
                };
                let target = dest.join(name);
                fs::copy(&object, &target).map_err(|e| {
                    BuildError::Merge(format!(
                        "Failed to copy {} -> {}: {}",
                        object.display(),
                        target.display(),
                        e
                    ))
                })?;
                fs::set_permissions(&target, fs::metadata(&object)?.permissions())?;
            }
        }
        Ok(())
    }
}

fn sorted_files(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    if !dir.is_dir() {
        return Err(BuildError::Merge(format!(
            "library directory is missing: {}",
            dir.display()
        )));
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Treats `*.a` and `*.dylib` as binaries and concatenates them.
    #[derive(Default)]
    struct Concat {
        calls: Mutex<Vec<(Vec<PathBuf>, PathBuf)>>,
    }

    impl BinaryCombiner for Arc<Concat> {
        fn is_combinable(&self, path: &Path) -> bool {
            path.extension()
                .is_some_and(|ext| ext == "a" || ext == "dylib")
        }

        fn combine(&self, inputs: &[PathBuf], output: &Path) -> Result<(), BuildError> {
            let mut joined = Vec::new();
            for input in inputs {
                joined.extend(fs::read(input)?);
            }
            fs::write(output, joined)?;
            self.calls
                .lock()
                .unwrap()
                .push((inputs.to_vec(), output.to_path_buf()));
            Ok(())
        }
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn archs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn abi_names() {
        assert_eq!(android_abi("arm"), "armeabi-v7a");
        assert_eq!(android_abi("arm64"), "arm64-v8a");
        assert_eq!(android_abi("x86"), "x86");
        assert_eq!(android_abi("x86_64"), "x86_64");
    }

    #[test]
    fn per_abi_layout() {
        let temp = TempDir::new().unwrap();
        let prefix = Prefix::at(temp.path());
        write(&prefix.arch_dir("arm").join("include/foo.h"), "arm header");
        write(&prefix.arch_dir("arm").join("lib/libfoo.so"), "arm so");
        write(&prefix.arch_dir("arm").join("lib/libfoo.a"), "arm static");
        write(&prefix.arch_dir("arm64").join("include/foo.h"), "arm64 header");
        write(&prefix.arch_dir("arm64").join("lib/libfoo.so"), "arm64 so");

        Merger::default()
            .merge(&prefix, Platform::Android, "foo", &archs(&["arm", "arm64"]))
            .unwrap();

        let out_lib = prefix.out_lib();
        assert_eq!(fs::read_to_string(out_lib.join("armeabi-v7a/libfoo.so")).unwrap(), "arm so");
        assert_eq!(fs::read_to_string(out_lib.join("arm64-v8a/libfoo.so")).unwrap(), "arm64 so");
        assert!(!out_lib.join("armeabi-v7a/libfoo.a").exists());
        assert_eq!(
            fs::read_to_string(prefix.out_include().join("foo.h")).unwrap(),
            "arm header"
        );

        let record = prefix.success_record().unwrap();
        assert_eq!(record.archs, archs(&["arm", "arm64"]));
        assert_eq!(record.platform, Platform::Android);
    }

    #[cfg(unix)]
    #[test]
    fn per_abi_preserves_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let prefix = Prefix::at(temp.path());
        let so = prefix.arch_dir("x86").join("lib/libfoo.so");
        write(&so, "x86 so");
        fs::set_permissions(&so, fs::Permissions::from_mode(0o755)).unwrap();

        Merger::default()
            .merge(&prefix, Platform::Android, "foo", &archs(&["x86"]))
            .unwrap();

        let mode = fs::metadata(prefix.out_lib().join("x86/libfoo.so"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn per_abi_requires_shared_objects() {
        let temp = TempDir::new().unwrap();
        let prefix = Prefix::at(temp.path());
        write(&prefix.arch_dir("arm").join("lib/libfoo.so"), "arm so");
        write(&prefix.arch_dir("x86").join("lib/libfoo.a"), "static only");

        let err = Merger::default()
            .merge(&prefix, Platform::Android, "foo", &archs(&["arm", "x86"]))
            .unwrap_err();
        assert!(matches!(err, BuildError::Merge(_)));
        assert!(!prefix.is_built());
    }

    #[test]
    fn missing_install_root_fails_before_touching_out() {
        let temp = TempDir::new().unwrap();
        let prefix = Prefix::at(temp.path());
        write(&prefix.arch_dir("arm").join("lib/libfoo.so"), "arm so");

        let err = Merger::default()
            .merge(&prefix, Platform::Android, "foo", &archs(&["arm", "arm64"]))
            .unwrap_err();
        assert!(err.to_string().contains("arm64"));
        assert!(!prefix.out_dir().exists());
    }

    #[test]
    fn fat_merge_combines_binaries_and_skips_others() {
        let temp = TempDir::new().unwrap();
        let prefix = Prefix::at(temp.path());
        for arch in ["x86_64", "arm64"] {
            write(&prefix.arch_dir(arch).join("lib/libfoo.a"), arch);
            write(&prefix.arch_dir(arch).join("lib/libfoo.la"), "libtool archive");
        }
        write(&prefix.arch_dir("x86_64").join("include/foo.h"), "header");

        let combiner = Arc::new(Concat::default());
        Merger::new(combiner.clone())
            .merge(&prefix, Platform::Macos, "foo", &archs(&["x86_64", "arm64"]))
            .unwrap();

        assert_eq!(
            fs::read_to_string(prefix.out_lib().join("libfoo.a")).unwrap(),
            "x86_64arm64"
        );
        assert!(!prefix.out_lib().join("libfoo.la").exists());
        assert!(prefix.out_include().join("foo.h").is_file());

        let calls = combiner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].0,
            vec![
                prefix.arch_dir("x86_64").join("lib/libfoo.a"),
                prefix.arch_dir("arm64").join("lib/libfoo.a"),
            ]
        );
        assert!(prefix.is_built());
    }

    #[test]
    fn fat_merge_of_header_only_library() {
        let temp = TempDir::new().unwrap();
        let prefix = Prefix::at(temp.path());
        for arch in ["x86_64", "arm64"] {
            write(&prefix.arch_dir(arch).join("include/foo.h"), arch);
        }

        let combiner = Arc::new(Concat::default());
        Merger::new(combiner.clone())
            .merge(&prefix, Platform::Macos, "foo", &archs(&["x86_64", "arm64"]))
            .unwrap();

        assert!(combiner.calls.lock().unwrap().is_empty());
        assert_eq!(
            fs::read_to_string(prefix.out_include().join("foo.h")).unwrap(),
            "x86_64"
        );
        assert!(prefix.is_built());
    }

    #[test]
    fn fat_merge_needs_every_arch_to_have_the_file() {
        let temp = TempDir::new().unwrap();
        let prefix = Prefix::at(temp.path());
        write(&prefix.arch_dir("armv7").join("lib/libfoo.a"), "armv7");
        fs::create_dir_all(prefix.arch_dir("arm64").join("lib")).unwrap();

        let err = Merger::new(Arc::new(Concat::default()))
            .merge(&prefix, Platform::Ios, "foo", &archs(&["armv7", "arm64"]))
            .unwrap_err();
        assert!(err.to_string().contains("libfoo.a"));
        assert!(!prefix.is_built());
    }

    #[test]
    fn missing_headers_are_not_fatal() {
        let temp = TempDir::new().unwrap();
        let prefix = Prefix::at(temp.path());
        write(&prefix.arch_dir("arm").join("lib/libfoo.so"), "so");

        Merger::default()
            .merge(&prefix, Platform::Android, "foo", &archs(&["arm"]))
            .unwrap();
        assert!(!prefix.out_include().exists());
        assert!(prefix.is_built());
    }

    #[test]
    fn empty_arch_list_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = Merger::default()
            .merge(&Prefix::at(temp.path()), Platform::Android, "foo", &[])
            .unwrap_err();
        assert!(matches!(err, BuildError::Merge(_)));
    }
}
