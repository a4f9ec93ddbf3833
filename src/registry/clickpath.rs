//! CLICKPATH file lookup.

use std::path::{Path, PathBuf};

/// Directory searched when a CLICKPATH entry is the empty string.
const DEFAULT_INSTALL_DIR: &str = "/usr/local/share/click";

/// The colon-separated search path from the `CLICKPATH` environment
/// variable. An empty entry stands for the compiled-in default
/// install directory.
pub fn clickpath() -> Vec<PathBuf> {
    let raw = std::env::var("CLICKPATH").unwrap_or_default();
    let mut out = Vec::new();
    if raw.is_empty() {
        out.push(PathBuf::from(DEFAULT_INSTALL_DIR));
        return out;
    }
    for entry in raw.split(':') {
        if entry.is_empty() {
            out.push(PathBuf::from(DEFAULT_INSTALL_DIR));
        } else {
            out.push(PathBuf::from(entry));
        }
    }
    out
}

/// Locate `name` for reading: first relative to `relative_to` (the
/// directory of the requiring file), then in each CLICKPATH entry,
/// both directly and under `subdir`.
pub fn find_file(name: &str, subdir: &str, relative_to: Option<&Path>) -> Option<PathBuf> {
    let name_path = Path::new(name);
    if name_path.is_absolute() {
        return name_path.is_file().then(|| name_path.to_path_buf());
    }

    if let Some(dir) = relative_to {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    for entry in clickpath() {
        let candidate = entry.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !subdir.is_empty() {
            let candidate = entry.join(subdir).join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_relative_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib.click");
        fs::write(&file, "// empty\n").unwrap();
        assert_eq!(
            find_file("lib.click", "conf", Some(dir.path())),
            Some(file.clone())
        );
        assert_eq!(find_file("lib.click", "conf", None), None);
        assert_eq!(
            find_file(file.to_str().unwrap(), "conf", None),
            Some(file)
        );
    }
}
