pub mod ps;
pub mod run;
pub mod scripts;
pub mod uv;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::auth;
use crate::config::{self, Config};
use crate::error::HfJobsError;
use crate::hub::HubClient;
use crate::pointer::RepoPointer;

/// Everything a handler needs besides its own arguments
pub struct AppContext {
    pub config: Config,
    pub pointer: RepoPointer,
    pub cwd: PathBuf,
}

impl AppContext {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Ok(Self {
            config: config::load_config(config_path)?,
            pointer: RepoPointer::default_location()?,
            cwd: std::env::current_dir().context("Failed to determine current directory")?,
        })
    }

    /// Hub client authenticated with `token`, or the token found in the environment
    pub fn hub(&self, token: Option<&str>) -> Result<HubClient> {
        let token = auth::resolve_token(token, &self.config.hub);
        Ok(HubClient::new(&self.config.hub.endpoint, token)?)
    }

    /// Resolves a user-supplied path against the working directory
    pub fn path(&self, path: &Path) -> PathBuf {
        self.cwd.join(path)
    }
}

/// A parsed subcommand
#[allow(async_fn_in_trait)]
pub trait Command {
    async fn run(&self, ctx: &AppContext) -> Result<()>;
}

pub(crate) const README: &str = "README.md";

/// Downloads the repository README, applies `update` and uploads the result.
///
/// Returns the new document, or `None` when `update` left it unchanged.
pub(crate) async fn update_remote_readme<F>(
    hub: &HubClient,
    repo_id: &str,
    update: F,
) -> crate::error::Result<Option<String>>
where
    F: FnOnce(&str) -> String,
{
    let current = hub.download_file(repo_id, README).await?;
    let updated = update(&current);
    if updated == current {
        tracing::debug!(repo = repo_id, "README already up to date");
        return Ok(None);
    }
    hub.upload_file(repo_id, README, updated.as_bytes()).await?;
    Ok(Some(updated))
}

/// README problems never fail a push
pub(crate) fn report_readme_update(result: crate::error::Result<Option<String>>) {
    match result {
        Ok(Some(_)) => println!("✅ README updated"),
        Ok(None) => {}
        Err(e) => eprintln!("Warning: Could not update README: {}", e),
    }
}

/// A script read from disk, ready for upload
pub(crate) struct LocalScript {
    pub path: PathBuf,
    pub name: String,
    pub content: String,
}

impl LocalScript {
    /// Reads the script, reporting a missing file as [`HfJobsError::NotFound`]
    pub fn read(ctx: &AppContext, path: &Path) -> Result<Self> {
        let full = ctx.path(path);
        if !full.is_file() {
            return Err(HfJobsError::NotFound(format!("script {}", path.display())).into());
        }
        let name = full
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("Invalid script path: {:?}", path))?;
        let content = std::fs::read_to_string(&full)
            .with_context(|| format!("Failed to read script: {:?}", full))?;
        Ok(Self {
            path: full,
            name,
            content,
        })
    }
}
