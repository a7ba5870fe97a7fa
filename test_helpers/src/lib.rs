//! Shared test infrastructure for the nuclei workspace.
//!
//! Two concerns live here:
//!
//! - Locating the workspace root and a persistent `test_output/` directory
//!   for artifacts worth inspecting by hand.
//! - Deterministic synthetic data: balls and boxes painted into stacks,
//!   noisy intensity fields over a mask, and bimodal feature populations.
//!   Everything random is driven by a seeded `StdRng`.
//!
//! Artifacts are grouped by what produced them:
//!
//! ```text
//! test_output/
//! ├── stacks/   # TIFF stacks and masks written by image and pipeline tests
//! └── tables/   # TSV feature tables from population selection
//! ```
//!
//! [`output_path`] creates the parent directories of the artifact path, so
//! `output_path("tables/g1.tsv")` is ready to write to.
//!
//! ```rust
//! use test_helpers::{ball, noisy_field, output_path};
//!
//! let mask = ball((16, 32, 32), [8.0, 16.0, 16.0], 6.0);
//! let raw = noisy_field(&mask, 100.0, 1000.0, 20.0, 7);
//! assert_eq!(raw.shape(), &[16, 32, 32]);
//! let artifact = output_path("stacks/ball.tif");
//! assert!(artifact.parent().is_some_and(|dir| dir.is_dir()));
//! ```

pub mod synthetic;

use once_cell::sync::Lazy;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub use synthetic::{ball, bimodal_population, cuboid, label_stack, noisy_field};

/// Directory under the workspace root that collects test artifacts.
pub const OUTPUT_DIR: &str = "test_output";

#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    /// No `Cargo.toml` with a `[workspace]` section above the current directory.
    #[error("Failed to find project root: {0}")]
    ProjectRootNotFound(String),
}

fn is_workspace_root(dir: &Path) -> bool {
    fs::read_to_string(dir.join("Cargo.toml"))
        .is_ok_and(|manifest| manifest.lines().any(|l| l.trim() == "[workspace]"))
}

/// Nearest ancestor of the current directory holding the workspace manifest.
pub fn find_project_root() -> Result<PathBuf, TestHelperError> {
    let start = env::current_dir().map_err(|e| {
        TestHelperError::ProjectRootNotFound(format!("current directory unavailable: {e}"))
    })?;
    start
        .ancestors()
        .find(|dir| is_workspace_root(dir))
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            TestHelperError::ProjectRootNotFound(format!(
                "no workspace manifest above {}",
                start.display()
            ))
        })
}

static PROJECT_ROOT: Lazy<PathBuf> =
    Lazy::new(|| find_project_root().expect("tests run inside the nuclei workspace"));

/// `<workspace>/test_output`, created on first use.
pub fn get_output_dir() -> PathBuf {
    let output_dir = PROJECT_ROOT.join(OUTPUT_DIR);
    fs::create_dir_all(&output_dir).expect("test output directory is writable");
    output_dir
}

/// Path of an artifact inside [`get_output_dir`], with its parent created.
pub fn output_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let artifact = get_output_dir().join(path);
    if let Some(parent) = artifact.parent() {
        fs::create_dir_all(parent).expect("artifact directory is writable");
    }
    artifact
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_root_exists() {
        let root = find_project_root().expect("Failed to find project root");
        assert!(root.exists());
        assert!(root.join("Cargo.toml").exists());
        assert!(root.join("nuclei").exists());
    }

    #[test]
    fn test_output_dir_created() {
        let output = get_output_dir();
        assert!(output.exists());
        assert!(output.is_dir());
    }

    #[test]
    fn test_output_path_creates_parent() {
        let path = output_path("tables/selection.tsv");
        assert_eq!(path, get_output_dir().join("tables").join("selection.tsv"));
        assert!(path.parent().unwrap().is_dir());
    }
}
