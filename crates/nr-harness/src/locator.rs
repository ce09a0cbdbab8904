//! Finding the reports a process wrote.

use nr_common::{report_name_pattern, ProcessId, DEFAULT_PREFIX};
use std::fs;
use std::path::{Path, PathBuf};

/// Reports for `pid` with the default `NodeReport` prefix.
pub fn find_reports(pid: ProcessId, dir: &Path) -> Vec<PathBuf> {
    find_reports_with_prefix(pid, dir, DEFAULT_PREFIX)
}

/// Reports in `dir` named `<prefix>.<date>.<time>.<pid>.<seq>.txt`, sorted.
///
/// A missing or unreadable directory yields no reports.
pub fn find_reports_with_prefix(pid: ProcessId, dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(pattern) = report_name_pattern(prefix, pid) else {
        return Vec::new();
    };
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| pattern.is_match(name))
        })
        .map(|entry| entry.path())
        .collect();
    found.sort();
    found
}

/// Delete report files, ignoring failures. Returns how many were removed.
pub fn remove_reports(paths: &[PathBuf]) -> usize {
    paths
        .iter()
        .filter(|path| fs::remove_file(path).is_ok())
        .count()
}
