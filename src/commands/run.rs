use std::io::Write;

use anyhow::Result;
use clap::Args;

use super::{AppContext, Command};
use crate::config::MonitorConfig;
use crate::error::HfJobsError;
use crate::hub::HubClient;
use crate::jobs::{parse_env_pairs, parse_timeout, JobApi, JobSpec, JobStage, JobTarget, JobsClient};
use crate::monitor::Monitor;

/// Options shared by every command that starts a job
#[derive(Args, Debug, Clone, Default)]
pub struct JobOptions {
    /// Environment variable for the job (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Secret environment variable for the job (repeatable)
    #[arg(short, long = "secret", value_name = "KEY=VALUE")]
    pub secret: Vec<String>,

    /// Hardware flavor, as in HF Spaces [default: cpu-basic]
    #[arg(long)]
    pub flavor: Option<String>,

    /// Maximum duration, e.g. 90, 30m, 2h
    #[arg(long)]
    pub timeout: Option<String>,

    /// Print the job id and return instead of following the logs
    #[arg(short, long)]
    pub detach: bool,

    /// User access token (defaults to HF_TOKEN or the cached login)
    #[arg(long)]
    pub token: Option<String>,
}

impl JobOptions {
    pub fn job_spec(
        &self,
        target: JobTarget,
        command: Vec<String>,
        default_flavor: &str,
    ) -> Result<JobSpec> {
        let flavor = self.flavor.as_deref().unwrap_or(default_flavor);
        let mut spec = JobSpec::new(target, command, flavor);
        spec.environment = parse_env_pairs(&self.env)?;
        spec.secrets = parse_env_pairs(&self.secret)?;
        spec.timeout_seconds = self.timeout.as_deref().map(parse_timeout).transpose()?;
        Ok(spec)
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Docker image, or a Space such as hf.co/spaces/<owner>/<name>
    pub image: String,

    #[command(flatten)]
    pub job: JobOptions,

    /// Command to run inside the container
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Command for RunArgs {
    async fn run(&self, ctx: &AppContext) -> Result<()> {
        let spec = self.job.job_spec(
            JobTarget::parse(&self.image),
            self.command.clone(),
            &ctx.config.run.default_flavor,
        )?;
        let hub = ctx.hub(self.job.token.as_deref())?;
        let mut stdout = std::io::stdout();
        launch(hub, &spec, self.job.detach, &ctx.config.monitor, &mut stdout).await
    }
}

/// Submits `spec`; prints the job id when detached, otherwise follows the job to the end
pub(crate) async fn launch<W: Write>(
    hub: HubClient,
    spec: &JobSpec,
    detach: bool,
    monitor: &MonitorConfig,
    out: &mut W,
) -> Result<()> {
    let jobs = JobsClient::connect(hub).await?;
    let job_id = jobs.submit(spec).await?;

    if detach {
        writeln!(out, "{}", job_id)?;
        return Ok(());
    }
    follow_job(&jobs, &job_id, monitor, out).await
}

/// Streams the job's logs and turns a non-completed final stage into [`HfJobsError::JobFailed`]
pub(crate) async fn follow_job<A: JobApi, W: Write>(
    api: &A,
    job_id: &str,
    config: &MonitorConfig,
    out: &mut W,
) -> Result<()> {
    let status = Monitor::new(api, config.poll_interval())
        .with_max_wait(config.max_wait())
        .watch(job_id, out)
        .await?;

    if status.stage != JobStage::Completed {
        let code = status.error.unwrap_or_else(|| status.stage.to_string());
        return Err(HfJobsError::JobFailed {
            message: status
                .message
                .unwrap_or_else(|| "Job did not complete".to_string()),
            code,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::{status, StubApi};
    use clap::Parser;
    use httpmock::prelude::*;
    use serde_json::json;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        args: RunArgs,
    }

    #[test]
    fn test_command_keeps_its_own_flags() {
        let cli = Cli::try_parse_from([
            "run",
            "-e",
            "A=1",
            "--flavor",
            "t4-small",
            "python:3.12",
            "python",
            "-c",
            "print(1)",
        ])
        .unwrap();

        assert_eq!(cli.args.image, "python:3.12");
        assert_eq!(cli.args.job.env, vec!["A=1"]);
        assert_eq!(cli.args.job.flavor.as_deref(), Some("t4-small"));
        assert_eq!(cli.args.command, vec!["python", "-c", "print(1)"]);
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["run", "ubuntu"]).is_err());
    }

    #[test]
    fn test_job_spec_from_options() {
        let options = JobOptions {
            env: vec!["GREETING=\"hi there\"".to_string()],
            secret: vec!["HF_TOKEN=hf_x".to_string()],
            timeout: Some("30m".to_string()),
            ..JobOptions::default()
        };
        let spec = options
            .job_spec(
                JobTarget::parse("hf.co/spaces/alice/app"),
                vec!["echo".to_string()],
                "cpu-basic",
            )
            .unwrap();

        assert_eq!(spec.flavor, "cpu-basic");
        assert_eq!(spec.environment["GREETING"], "hi there");
        assert_eq!(spec.secrets["HF_TOKEN"], "hf_x");
        assert_eq!(spec.timeout_seconds, Some(1800));
        assert_eq!(spec.target, JobTarget::Space("alice/app".to_string()));
    }

    #[test]
    fn test_job_spec_rejects_bad_env() {
        let options = JobOptions {
            env: vec!["JUSTAKEY".to_string()],
            ..JobOptions::default()
        };
        let err = options
            .job_spec(JobTarget::parse("ubuntu"), vec![], "cpu-basic")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HfJobsError>(),
            Some(HfJobsError::InvalidArgument(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_job_completed() {
        let api = StubApi::default();
        api.statuses
            .borrow_mut()
            .push_back(status(JobStage::Completed, None, None));

        let mut out = Vec::new();
        follow_job(&api, "job-1", &MonitorConfig::default(), &mut out)
            .await
            .unwrap();
        assert!(!String::from_utf8(out).unwrap().contains("error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_follow_job_failure_is_an_error() {
        let api = StubApi::default();
        api.statuses.borrow_mut().push_back(status(
            JobStage::Error,
            Some("Job failed"),
            Some("OOM"),
        ));

        let mut out = Vec::new();
        let err = follow_job(&api, "job-1", &MonitorConfig::default(), &mut out)
            .await
            .unwrap_err();

        match err.downcast_ref::<HfJobsError>() {
            Some(HfJobsError::JobFailed { message, code }) => {
                assert_eq!(message, "Job failed");
                assert_eq!(code, "OOM");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(String::from_utf8(out).unwrap().contains("Job failed (OOM)"));
    }

    #[tokio::test]
    async fn test_detached_launch_prints_job_id() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/whoami-v2");
                then.status(200).json_body(json!({ "name": "alice" }));
            })
            .await;
        let submit = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/jobs/alice")
                    .header("authorization", "Bearer hf_test");
                then.status(200)
                    .json_body(json!({ "metadata": { "job_id": "job-123" } }));
            })
            .await;

        let hub = HubClient::new(&server.base_url(), Some("hf_test".to_string())).unwrap();
        let spec = JobSpec::new(
            JobTarget::parse("ubuntu"),
            vec!["echo".to_string(), "hi".to_string()],
            "cpu-basic",
        );
        let mut out = Vec::new();
        launch(hub, &spec, true, &MonitorConfig::default(), &mut out)
            .await
            .unwrap();

        submit.assert_async().await;
        assert_eq!(String::from_utf8(out).unwrap(), "job-123\n");
    }

    #[tokio::test]
    async fn test_follow_job_survives_refused_log_stream() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/whoami-v2");
                then.status(200).json_body(json!({ "name": "alice" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/jobs/alice/job-1/logs-stream");
                then.status(503).body("logs not ready");
            })
            .await;
        let status_check = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/jobs/alice/job-1");
                then.status(200).json_body(json!({
                    "id": "job-1",
                    "status": { "stage": "COMPLETED" },
                }));
            })
            .await;

        let hub = HubClient::new(&server.base_url(), Some("hf_test".to_string())).unwrap();
        let jobs = JobsClient::connect(hub).await.unwrap();
        let mut out = Vec::new();
        follow_job(&jobs, "job-1", &MonitorConfig::default(), &mut out)
            .await
            .unwrap();

        status_check.assert_async().await;
        assert!(out.is_empty());
    }
}
