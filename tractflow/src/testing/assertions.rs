//! Assertions over output trees.

use std::path::Path;

use crate::checkpoint::count_matching;

/// Asserts that `dir` holds exactly `expected` files matching `pattern`.
pub fn assert_file_count(dir: &Path, pattern: &str, expected: usize) {
    let actual = count_matching(dir, pattern);
    assert_eq!(
        actual,
        expected,
        "Expected {expected} x {pattern} in {}, found {actual}",
        dir.display()
    );
}

/// Asserts that a path exists.
pub fn assert_present(path: &Path) {
    assert!(path.exists(), "Expected {} to exist", path.display());
}

/// Asserts that a path does not exist.
pub fn assert_absent(path: &Path) {
    assert!(!path.exists(), "Expected {} to be removed", path.display());
}
