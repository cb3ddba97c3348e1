//! Local state: the last-used repository and per-project config files

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Directory inside a project that marks it as a script directory
pub const PROJECT_DIR: &str = ".hfjobs";

/// Remembers the repository most recently created by `init`.
///
/// Handlers receive this explicitly so tests can point it at a temp dir.
#[derive(Debug, Clone)]
pub struct RepoPointer {
    path: PathBuf,
}

impl RepoPointer {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Pointer stored at `~/.hfjobs/last_uv_repo`
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(crate::config::state_dir()?.join("last_uv_repo")))
    }

    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {:?}", self.path))?;
        let repo = content.trim();
        Ok((!repo.is_empty()).then(|| repo.to_string()))
    }

    pub fn save(&self, repo_id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        std::fs::write(&self.path, repo_id)
            .with_context(|| format!("Failed to write {:?}", self.path))?;
        Ok(())
    }
}

/// A local script directory created by `uv init`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    /// The directory holding `.hfjobs/`
    pub root: PathBuf,
    pub repo_id: String,
}

impl ProjectConfig {
    fn config_path(root: &Path) -> PathBuf {
        root.join(PROJECT_DIR).join("config")
    }

    /// Creates `<root>/.hfjobs/config` with a `repo=` line
    pub fn create(root: &Path, repo_id: &str) -> Result<Self> {
        let dir = root.join(PROJECT_DIR);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        let path = Self::config_path(root);
        std::fs::write(&path, format!("repo={}\n", repo_id))
            .with_context(|| format!("Failed to write project config: {:?}", path))?;
        Ok(Self {
            root: root.to_path_buf(),
            repo_id: repo_id.to_string(),
        })
    }

    /// Reads the config in `root` only; `Ok(None)` when there is none.
    ///
    /// A config without a `repo=` line is an error.
    pub fn open(root: &Path) -> Result<Option<Self>> {
        let path = Self::config_path(root);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read project config: {:?}", path))?;
        let repo_id = content
            .lines()
            .find_map(|line| line.trim().strip_prefix("repo="))
            .map(str::trim)
            .filter(|repo| !repo.is_empty())
            .with_context(|| format!("No repo= line in {:?}", path))?;
        Ok(Some(Self {
            root: root.to_path_buf(),
            repo_id: repo_id.to_string(),
        }))
    }

    /// Looks in `dir`, then in its parent
    pub fn discover(dir: &Path) -> Result<Option<Self>> {
        if let Some(config) = Self::open(dir)? {
            return Ok(Some(config));
        }
        match dir.parent() {
            Some(parent) => Self::open(parent),
            None => Ok(None),
        }
    }
}
