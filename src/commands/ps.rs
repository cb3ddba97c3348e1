use anyhow::Result;
use clap::Args;
use tabled::{builder::Builder, settings::Style};

use super::{AppContext, Command};
use crate::jobs::{JobInfo, JobStage, JobsClient};

/// Width of the COMMAND column before it is cut with an ellipsis
const COMMAND_WIDTH: usize = 40;

#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show all jobs, including finished ones
    #[arg(short, long)]
    pub all: bool,

    /// User access token (defaults to HF_TOKEN or the cached login)
    #[arg(long)]
    pub token: Option<String>,
}

impl Command for PsArgs {
    async fn run(&self, ctx: &AppContext) -> Result<()> {
        let hub = ctx.hub(self.token.as_deref())?;
        let jobs = JobsClient::connect(hub).await?;
        let list = jobs.list().await?;

        match render_jobs_table(&list, self.all) {
            Some(table) => println!("{}", table),
            None if self.all => println!("No jobs found"),
            None => println!("No running jobs found (use --all to include finished jobs)"),
        }
        Ok(())
    }
}

/// Jobs that have not finished yet
fn is_unfinished(job: &JobInfo) -> bool {
    let stage = job.stage();
    stage.is_active() || stage == JobStage::Pending
}

/// Renders the job table, newest first; `None` when no job passes the filter
pub fn render_jobs_table(jobs: &[JobInfo], all: bool) -> Option<String> {
    let mut shown: Vec<&JobInfo> = jobs.iter().filter(|j| all || is_unfinished(j)).collect();
    if shown.is_empty() {
        return None;
    }
    shown.sort_by(|a, b| b.created().cmp(&a.created()));

    let mut builder = Builder::default();
    builder.push_record(["JOB ID", "IMAGE/SPACE", "COMMAND", "CREATED", "STATUS"]);
    for job in shown {
        let created = job
            .created()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        builder.push_record([
            job.job_id().unwrap_or("-").to_string(),
            job.image().to_string(),
            command_line(job),
            created,
            job.stage().to_string(),
        ]);
    }

    let mut table = builder.build();
    table.with(Style::blank());
    Some(table.to_string())
}

fn command_line(job: &JobInfo) -> String {
    let full = job
        .command
        .iter()
        .chain(job.arguments.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    if full.chars().count() <= COMMAND_WIDTH {
        return full;
    }
    let cut: String = full.chars().take(COMMAND_WIDTH - 3).collect();
    format!("{}...", cut)
}
