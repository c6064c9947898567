//! [`TestLayout`] fixture: a throwaway filesystem with every search scope.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory tree standing in for the machine's search path.
///
/// ```text
/// <root>/system/      system-wide directory (like /etc/conda)
/// <root>/conda_root/  base installation
/// <root>/home/        user home
/// <root>/prefix/      active environment
/// ```
///
/// # Example
///
/// ```rust,no_run
/// use condarc_test_utils::TestLayout;
///
/// let layout = TestLayout::new();
/// layout.write("home/.condarc", "channels:\n  - conda-forge\n");
/// layout.assert_file_contains("home/.condarc", "conda-forge");
/// ```
pub struct TestLayout {
    temp_dir: TempDir,
}

impl Default for TestLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl TestLayout {
    /// Create the tree with empty scope directories.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        for dir in ["system", "conda_root", "home", "prefix"] {
            fs::create_dir_all(temp_dir.path().join(dir)).unwrap();
        }
        Self { temp_dir }
    }

    /// Return the root path of the temporary directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn system_dir(&self) -> PathBuf {
        self.path("system")
    }

    pub fn conda_root(&self) -> PathBuf {
        self.path("conda_root")
    }

    pub fn home(&self) -> PathBuf {
        self.path("home")
    }

    pub fn prefix(&self) -> PathBuf {
        self.path("prefix")
    }

    /// Absolute path of `rel` inside the tree.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Write `content` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let full_path = self.path(rel);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full_path, content).unwrap();
        full_path
    }

    /// Read `rel` as text.
    ///
    /// # Panics
    /// Panics if the file cannot be read.
    pub fn read(&self, rel: &str) -> String {
        let full_path = self.path(rel);
        fs::read_to_string(&full_path)
            .unwrap_or_else(|_| panic!("Could not read file: {}", full_path.display()))
    }

    /// Mark `rel` read-only.
    pub fn make_read_only(&self, rel: &str) {
        let full_path = self.path(rel);
        let mut perms = fs::metadata(&full_path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&full_path, perms).unwrap();
    }

    /// Assert that `rel` does **not** exist.
    pub fn assert_file_not_exists(&self, rel: &str) {
        let full_path = self.path(rel);
        assert!(
            !full_path.exists(),
            "Expected file NOT to exist: {}",
            full_path.display()
        );
    }

    /// Assert that the file at `rel` contains `content`.
    ///
    /// # Panics
    /// Panics if the file cannot be read or does not contain `content`.
    pub fn assert_file_contains(&self, rel: &str, content: &str) {
        let file_content = self.read(rel);
        assert!(
            file_content.contains(content),
            "File {} does not contain expected content.\nExpected: {}\nActual: {}",
            self.path(rel).display(),
            content,
            file_content
        );
    }
}
