//! `hfjobs uv`: collections of UV scripts backed by a local directory

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use sha2::{Digest, Sha256};

use super::run::{launch, JobOptions};
use super::scripts::{
    create_new_repo, print_run_hint, repo_or_last, script_or_template, InitArgs, PushArgs,
};
use super::{report_readme_update, update_remote_readme, AppContext, Command, LocalScript, README};
use crate::error::HfJobsError;
use crate::hub::{resolve_repo_id, short_name, HubClient};
use crate::jobs::JobTarget;
use crate::pointer::ProjectConfig;
use crate::readme;
use crate::script_meta::ScriptMeta;

#[derive(Args, Debug)]
pub struct UvArgs {
    #[command(subcommand)]
    pub command: UvCommand,
}

#[derive(Subcommand, Debug)]
pub enum UvCommand {
    /// Create a script repository and a local directory tracking it
    Init(InitArgs),
    /// Upload a UV script and list it in the repository README
    Push(PushArgs),
    /// Upload the scripts of the current directory
    Sync(SyncArgs),
    /// Upload a UV script and run it as a job
    Run(UvRunArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Files or glob patterns to sync, relative to the project root [default: *.py]
    pub files: Vec<String>,

    /// Show what would be synced without uploading
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct UvRunArgs {
    /// UV script to run
    pub script: PathBuf,

    /// Repository for the script (defaults to the local project, then a temporary one)
    #[arg(long)]
    pub repo: Option<String>,

    /// Python version of the uv image
    #[arg(long, default_value = "3.12")]
    pub python: String,

    #[command(flatten)]
    pub job: JobOptions,

    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub script_args: Vec<String>,
}

impl Command for UvArgs {
    async fn run(&self, ctx: &AppContext) -> Result<()> {
        match &self.command {
            UvCommand::Init(args) => init(ctx, args).await,
            UvCommand::Push(args) => push(ctx, args).await,
            UvCommand::Sync(args) => sync(ctx, args).await,
            UvCommand::Run(args) => run_script(ctx, args).await,
        }
    }
}

/// `<user>/hfjobs-uv-run-<timestamp>-<hash>`, unique per script content and second
pub fn ephemeral_repo_id(user: &str, content: &str, now: DateTime<Utc>) -> String {
    let digest = hex::encode(Sha256::digest(content.as_bytes()));
    format!(
        "{}/hfjobs-uv-run-{}-{}",
        user,
        now.format("%Y%m%d-%H%M%S"),
        &digest[..8]
    )
}

/// Tag of the uv image carrying the requested Python version
pub fn uv_image(base: &str, python: &str) -> String {
    format!("{}:python{}-bookworm-slim", base, python)
}

async fn init(ctx: &AppContext, args: &InitArgs) -> Result<()> {
    let hub = ctx.hub(None)?;
    let repo_id = resolve_repo_id(&hub, &args.repo).await?;

    let local_dir = ctx.path(Path::new(short_name(&repo_id)));
    if local_dir.exists() {
        bail!("Directory '{}' already exists", local_dir.display());
    }
    let script = script_or_template(ctx, args.script.as_ref())?;

    create_new_repo(&hub, &repo_id, args.private).await?;

    println!("Creating local directory: {}", local_dir.display());
    std::fs::create_dir_all(&local_dir)
        .with_context(|| format!("Failed to create directory: {:?}", local_dir))?;
    ProjectConfig::create(&local_dir, &repo_id)?;

    if args.script.is_some() {
        println!("Uploading script: {}", script.name);
    } else {
        println!("Creating template script: {}", script.name);
    }
    let local_script = local_dir.join(&script.name);
    std::fs::write(&local_script, &script.content)
        .with_context(|| format!("Failed to write {:?}", local_script))?;
    hub.upload_file(&repo_id, &script.name, script.content.as_bytes())
        .await?;

    println!("Creating README with usage instructions");
    let meta = ScriptMeta::extract(&script.content);
    let doc = readme::render_collection(&repo_id, &script.name, meta.description.as_deref());
    let local_readme = local_dir.join(README);
    std::fs::write(&local_readme, &doc)
        .with_context(|| format!("Failed to write {:?}", local_readme))?;
    hub.upload_file(&repo_id, README, doc.as_bytes()).await?;

    ctx.pointer.save(&repo_id)?;

    println!("\n✅ Created local directory: {}", local_dir.display());
    println!("✅ Script published to: {}", hub.dataset_url(&repo_id));
    print_run_hint(&hub, &repo_id, &script.name);
    println!("\nLocal directory: cd {}", local_dir.display());
    Ok(())
}

/// Adds a table row for `script_name` to the remote README
async fn list_in_readme(hub: &HubClient, repo_id: &str, script: &LocalScript) {
    let meta = ScriptMeta::extract(&script.content);
    let result = update_remote_readme(hub, repo_id, |doc| {
        readme::add_script_row(doc, repo_id, &script.name, meta.description.as_deref())
    })
    .await;
    report_readme_update(result);
}

async fn push(ctx: &AppContext, args: &PushArgs) -> Result<()> {
    let hub = ctx.hub(None)?;
    let project = ProjectConfig::discover(&ctx.cwd)?;
    let repo_id = match (&args.repo, &project) {
        (Some(_), _) | (None, None) => repo_or_last(ctx, &hub, args.repo.as_deref()).await?,
        (None, Some(project)) => project.repo_id.clone(),
    };
    let script = LocalScript::read(ctx, &args.script)?;
    if !hub.repo_exists(&repo_id).await? {
        return Err(HfJobsError::NotFound(format!("repository {}", repo_id)).into());
    }

    println!("Uploading: {}", script.name);
    if let Some(project) = project.filter(|p| p.repo_id == repo_id) {
        if script.path.parent() != Some(project.root.as_path()) {
            let copy = project.root.join(&script.name);
            std::fs::write(&copy, &script.content)
                .with_context(|| format!("Failed to write {:?}", copy))?;
            println!("Saved locally: {}", copy.display());
        }
    }
    hub.upload_file(&repo_id, &script.name, script.content.as_bytes())
        .await?;

    println!("Updating README...");
    list_in_readme(&hub, &repo_id, &script).await;

    println!("✅ Script added to repository");
    println!("View at: {}", hub.dataset_url(&repo_id));
    Ok(())
}

/// Expands `patterns` under `root`; hidden files and directories are skipped
fn files_to_sync(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let defaults = ["*.py".to_string()];
    let patterns = if patterns.is_empty() {
        &defaults[..]
    } else {
        patterns
    };

    let mut files = BTreeSet::new();
    for pattern in patterns {
        let full = root.join(pattern);
        let full = full.to_string_lossy();
        for entry in glob::glob(&full).with_context(|| format!("Invalid pattern: {}", pattern))? {
            let path = entry.context("Failed to read directory entry")?;
            let hidden = path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if path.is_file() && !hidden {
                files.insert(path);
            }
        }
    }
    Ok(files.into_iter().collect())
}

async fn sync(ctx: &AppContext, args: &SyncArgs) -> Result<()> {
    let Some(project) = ProjectConfig::discover(&ctx.cwd)? else {
        bail!("Not in a UV directory. Run from within a directory created by `hfjobs uv init`");
    };

    let files = files_to_sync(&project.root, &args.files)?;
    if files.is_empty() {
        println!("No files to sync");
        return Ok(());
    }

    println!("Repository: {}", project.repo_id);
    println!("Files to sync:");
    for file in &files {
        println!("  - {}", file.file_name().unwrap_or_default().to_string_lossy());
    }
    if args.dry_run {
        println!("\n--dry-run specified, not uploading");
        return Ok(());
    }

    let hub = ctx.hub(None)?;
    let repo_id = &project.repo_id;
    let mut scripts = Vec::new();
    for file in &files {
        let script = LocalScript::read(ctx, file)?;
        println!("\nUploading: {}", script.name);
        hub.upload_file(repo_id, &script.name, script.content.as_bytes())
            .await?;
        if file.extension().is_some_and(|ext| ext == "py") {
            scripts.push(script);
        }
    }

    println!("\nUpdating README...");
    let result = update_remote_readme(&hub, repo_id, |doc| {
        scripts.iter().fold(doc.to_string(), |doc, script| {
            let meta = ScriptMeta::extract(&script.content);
            readme::add_script_row(&doc, repo_id, &script.name, meta.description.as_deref())
        })
    })
    .await;
    if let Ok(Some(doc)) = &result {
        let local_readme = project.root.join(README);
        std::fs::write(&local_readme, doc)
            .with_context(|| format!("Failed to write {:?}", local_readme))?;
    }
    report_readme_update(result);

    println!("\n✅ Sync complete: {}", hub.dataset_url(repo_id));
    Ok(())
}

async fn run_script(ctx: &AppContext, args: &UvRunArgs) -> Result<()> {
    run_script_at(ctx, args, Utc::now()).await
}

/// `now` names and dates a temporary repository
async fn run_script_at(ctx: &AppContext, args: &UvRunArgs, now: DateTime<Utc>) -> Result<()> {
    let script = LocalScript::read(ctx, &args.script)?;
    let image = uv_image(&ctx.config.run.uv_image, &args.python);
    // Bad -e/-s/--timeout values are reported before anything is uploaded
    let mut spec = args.job.job_spec(
        JobTarget::DockerImage(image),
        Vec::new(),
        &ctx.config.run.default_flavor,
    )?;
    let hub = ctx.hub(args.job.token.as_deref())?;

    let (repo_id, ephemeral) = match (&args.repo, ProjectConfig::discover(&ctx.cwd)?) {
        (Some(repo), _) => (resolve_repo_id(&hub, repo).await?, false),
        (None, Some(project)) => {
            println!("Using repository from local config: {}", project.repo_id);
            (project.repo_id, false)
        }
        (None, None) => {
            let user = hub.whoami().await?;
            (ephemeral_repo_id(&user, &script.content, now), true)
        }
    };

    if hub.repo_exists(&repo_id).await? {
        println!("Using existing repository: {}", repo_id);
    } else {
        println!("Creating repository: {}", repo_id);
        hub.create_repo(&repo_id, false, true).await?;
    }

    println!("Uploading {}...", script.name);
    hub.upload_file(&repo_id, &script.name, script.content.as_bytes())
        .await?;
    let script_url = hub.resolve_url(&repo_id, &script.name);
    println!("✓ Script uploaded to: {}", script_url);
    println!("✓ Repository: {}", hub.dataset_url(&repo_id));

    let meta = ScriptMeta::extract(&script.content);
    let doc = if ephemeral {
        println!("✓ Temporary repository created: {}", repo_id);
        Some(readme::render_ephemeral(
            &script.name,
            &script_url,
            meta.description.as_deref(),
            now,
        ))
    } else {
        match hub.download_file(&repo_id, README).await {
            Ok(existing) => {
                let updated = readme::add_script_row(
                    &existing,
                    &repo_id,
                    &script.name,
                    meta.description.as_deref(),
                );
                (updated != existing).then_some(updated)
            }
            Err(HfJobsError::NotFound(_)) => Some(readme::render_collection(
                &repo_id,
                &script.name,
                meta.description.as_deref(),
            )),
            Err(e) => return Err(e.into()),
        }
    };
    if let Some(doc) = doc {
        hub.upload_file(&repo_id, README, doc.as_bytes()).await?;
    }

    spec.command = ["uv", "run", script_url.as_str()]
        .into_iter()
        .map(String::from)
        .chain(args.script_args.iter().cloned())
        .collect();

    println!("Starting job on HF infrastructure...");
    let mut stdout = std::io::stdout();
    launch(hub, &spec, args.job.detach, &ctx.config.monitor, &mut stdout).await
}
