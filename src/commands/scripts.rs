//! `hfjobs scripts`: share single UV scripts as dataset repositories

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Subcommand};

use super::{report_readme_update, update_remote_readme, AppContext, Command, LocalScript, README};
use crate::error::HfJobsError;
use crate::hub::{resolve_repo_id, HubClient};
use crate::readme;
use crate::script_meta::ScriptMeta;
use crate::templates::{TEMPLATE_SCRIPT, TEMPLATE_SCRIPT_NAME};

#[derive(Args, Debug)]
pub struct ScriptsArgs {
    #[command(subcommand)]
    pub command: ScriptsCommand,
}

#[derive(Subcommand, Debug)]
pub enum ScriptsCommand {
    /// Create a dataset repository holding a UV script
    Init(InitArgs),
    /// Upload a UV script to an existing repository
    Push(PushArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Repository name, e.g. `username/my-script` or just `my-script`
    pub repo: String,

    /// UV script to upload (a template is created when omitted)
    pub script: Option<PathBuf>,

    /// Make the repository private
    #[arg(long)]
    pub private: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PushArgs {
    /// UV script to push
    pub script: PathBuf,

    /// Repository to push to (defaults to the last initialized one)
    #[arg(long)]
    pub repo: Option<String>,
}

impl Command for ScriptsArgs {
    async fn run(&self, ctx: &AppContext) -> Result<()> {
        match &self.command {
            ScriptsCommand::Init(args) => init(ctx, args).await,
            ScriptsCommand::Push(args) => push(ctx, args).await,
        }
    }
}

/// The script named on the command line, or the built-in template
pub(crate) fn script_or_template(ctx: &AppContext, script: Option<&PathBuf>) -> Result<LocalScript> {
    match script {
        Some(path) => LocalScript::read(ctx, path),
        None => Ok(LocalScript {
            path: PathBuf::from(TEMPLATE_SCRIPT_NAME),
            name: TEMPLATE_SCRIPT_NAME.to_string(),
            content: TEMPLATE_SCRIPT.to_string(),
        }),
    }
}

/// Creates a fresh repository; one that already exists is an error
pub(crate) async fn create_new_repo(hub: &HubClient, repo_id: &str, private: bool) -> Result<()> {
    println!("Creating repository: {}", repo_id);
    hub.create_repo(repo_id, private, false).await?;
    Ok(())
}

pub(crate) fn print_run_hint(hub: &HubClient, repo_id: &str, script_name: &str) {
    println!("\nRun your script with:");
    println!("hfjobs run ghcr.io/astral-sh/uv:python3.12 \\");
    println!("  uv run {} \\", hub.resolve_url(repo_id, script_name));
    println!("  <your-args>");
}

/// The `--repo` flag, otherwise the remembered repository
pub(crate) async fn repo_or_last(
    ctx: &AppContext,
    hub: &HubClient,
    repo: Option<&str>,
) -> Result<String> {
    if let Some(repo) = repo {
        return Ok(resolve_repo_id(hub, repo).await?);
    }
    match ctx.pointer.load()? {
        Some(repo_id) => Ok(repo_id),
        None => bail!(
            "No repository specified and no previous repository found\n\
             Use --repo to specify a repository or run `hfjobs scripts init` first"
        ),
    }
}

async fn init(ctx: &AppContext, args: &InitArgs) -> Result<()> {
    let hub = ctx.hub(None)?;
    let repo_id = resolve_repo_id(&hub, &args.repo).await?;
    let script = script_or_template(ctx, args.script.as_ref())?;

    create_new_repo(&hub, &repo_id, args.private).await?;

    if args.script.is_some() {
        println!("Uploading script: {}", script.name);
    } else {
        println!("Creating template script: {}", script.name);
    }
    hub.upload_file(&repo_id, &script.name, script.content.as_bytes())
        .await?;

    println!("Creating README with usage instructions");
    let meta = ScriptMeta::extract(&script.content);
    let script_url = hub.resolve_url(&repo_id, &script.name);
    let doc = readme::render_single_script(&repo_id, &script.name, &script_url, &meta);
    hub.upload_file(&repo_id, README, doc.as_bytes()).await?;

    ctx.pointer.save(&repo_id)?;

    println!("\n✅ Script published to: {}", hub.dataset_url(&repo_id));
    print_run_hint(&hub, &repo_id, &script.name);
    Ok(())
}

async fn push(ctx: &AppContext, args: &PushArgs) -> Result<()> {
    let hub = ctx.hub(None)?;
    let repo_id = repo_or_last(ctx, &hub, args.repo.as_deref()).await?;
    let script = LocalScript::read(ctx, &args.script)?;
    if !hub.repo_exists(&repo_id).await? {
        return Err(HfJobsError::NotFound(format!("repository {}", repo_id)).into());
    }

    println!("Uploading: {}", script.name);
    hub.upload_file(&repo_id, &script.name, script.content.as_bytes())
        .await?;

    println!("Updating README...");
    let meta = ScriptMeta::extract(&script.content);
    let script_url = hub.resolve_url(&repo_id, &script.name);
    let result = update_remote_readme(&hub, &repo_id, |doc| {
        if doc.contains(&script.name) {
            doc.to_string()
        } else {
            readme::add_script_section(doc, &script.name, &script_url, &meta)
        }
    })
    .await;
    report_readme_update(result);

    println!("✅ Script added to repository");
    println!("View at: {}", hub.dataset_url(&repo_id));
    Ok(())
}
