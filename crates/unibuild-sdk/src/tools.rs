//! Required executable checks.

use std::path::PathBuf;

use tracing::{debug, error};

/// Counts the tools in `names` that cannot be found on `PATH`.
///
/// Logs one error line per missing tool. Returns zero when everything is
/// available; whether a non-zero count is fatal is up to the caller.
pub fn check_tools<S: AsRef<str>>(names: &[S]) -> usize {
    missing_tools(names).len()
}

/// Returns the names from `names` that cannot be found on `PATH`, in order.
pub fn missing_tools<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut missing = Vec::new();
    for name in names {
        let name = name.as_ref();
        match locate(name) {
            Some(path) => debug!(tool = name, path = %path.display(), "found required tool"),
            None => {
                error!("{} is required but was not found on PATH; please install it", name);
                missing.push(name.to_string());
            }
        }
    }
    missing
}

/// Resolves `name` against `PATH`.
pub fn locate(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_is_success() {
        let none: [&str; 0] = [];
        assert_eq!(check_tools(&none), 0);
    }

    #[test]
    fn counts_each_missing_tool() {
        let names = ["nonexistent-tool-a-12345", "nonexistent-tool-b-12345"];
        assert_eq!(check_tools(&names), 2);
        assert_eq!(missing_tools(&names), names.to_vec());
    }

    #[cfg(unix)]
    #[test]
    fn finds_shell() {
        assert!(locate("sh").is_some());
        assert_eq!(check_tools(&["sh", "nonexistent-tool-12345"]), 1);
    }
}
