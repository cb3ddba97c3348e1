//! Job submission and inspection against the Hub jobs API

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HfJobsError, Result};
use crate::hub::{check_response, HubClient};

/// Prefixes that turn an image argument into a Space reference
const SPACE_PREFIXES: &[&str] = &[
    "https://huggingface.co/spaces/",
    "https://hf.co/spaces/",
    "huggingface.co/spaces/",
    "hf.co/spaces/",
];

/// What the job runs in: a Docker image or the image built for a Space
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobTarget {
    #[serde(rename = "dockerImage")]
    DockerImage(String),
    #[serde(rename = "spaceId")]
    Space(String),
}

impl JobTarget {
    pub fn parse(value: &str) -> Self {
        SPACE_PREFIXES
            .iter()
            .find_map(|prefix| value.strip_prefix(prefix))
            .map(|space| JobTarget::Space(space.to_string()))
            .unwrap_or_else(|| JobTarget::DockerImage(value.to_string()))
    }
}

/// Body of a job creation request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub command: Vec<String>,
    pub arguments: Vec<String>,
    pub environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, String>,
    pub flavor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(flatten)]
    pub target: JobTarget,
}

impl JobSpec {
    pub fn new(target: JobTarget, command: Vec<String>, flavor: &str) -> Self {
        Self {
            command,
            arguments: Vec::new(),
            environment: BTreeMap::new(),
            secrets: BTreeMap::new(),
            flavor: flavor.to_string(),
            timeout_seconds: None,
            target,
        }
    }
}

/// Lifecycle stage reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum JobStage {
    Pending,
    Running,
    Updating,
    Completed,
    Error,
    Canceled,
    Deleted,
    Unknown,
}

impl JobStage {
    /// Stages in which logs may still show up
    pub fn is_active(self) -> bool {
        matches!(self, JobStage::Running | JobStage::Updating)
    }
}

impl From<String> for JobStage {
    fn from(stage: String) -> Self {
        match stage.to_ascii_uppercase().as_str() {
            "PENDING" => JobStage::Pending,
            "RUNNING" => JobStage::Running,
            "UPDATING" => JobStage::Updating,
            "COMPLETED" => JobStage::Completed,
            "ERROR" => JobStage::Error,
            "CANCELED" | "CANCELLED" => JobStage::Canceled,
            "DELETED" => JobStage::Deleted,
            _ => JobStage::Unknown,
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Pending => "PENDING",
            JobStage::Running => "RUNNING",
            JobStage::Updating => "UPDATING",
            JobStage::Completed => "COMPLETED",
            JobStage::Error => "ERROR",
            JobStage::Canceled => "CANCELED",
            JobStage::Deleted => "DELETED",
            JobStage::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    pub stage: JobStage,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobMetadata {
    pub job_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A job as returned by the status and list endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub metadata: Option<JobMetadata>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub docker_image: Option<String>,
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub arguments: Vec<String>,
    pub status: Option<JobStatus>,
}

impl JobInfo {
    pub fn job_id(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.job_id.as_deref())
            .or(self.id.as_deref())
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .as_ref()
            .and_then(|m| m.created_at)
            .or(self.created_at)
    }

    pub fn image(&self) -> &str {
        self.docker_image
            .as_deref()
            .or(self.space_id.as_deref())
            .unwrap_or("-")
    }

    pub fn stage(&self) -> JobStage {
        self.status
            .as_ref()
            .map(|s| s.stage)
            .unwrap_or(JobStage::Unknown)
    }
}

/// One event from the log stream
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LogEvent {
    pub data: String,
    #[serde(default)]
    pub timestamp: String,
}

impl LogEvent {
    /// The platform opens every stream with a synthetic "Job started" event
    pub fn is_keepalive(&self) -> bool {
        self.data.starts_with("===== Job started")
    }
}

/// Parses a `data: {...}` stream line; anything else yields `None`
pub fn parse_log_line(line: &str) -> Option<LogEvent> {
    let payload = line.strip_prefix("data: ")?;
    if !payload.starts_with('{') {
        return None;
    }
    serde_json::from_str(payload).ok()
}

/// Read access to a running job, as needed by the log monitor
#[allow(async_fn_in_trait)]
pub trait JobApi {
    /// Streams raw log lines to `on_line` until the server closes the stream
    async fn follow_logs<F>(&self, job_id: &str, on_line: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<()>;

    async fn status(&self, job_id: &str) -> Result<JobStatus>;
}

/// Jobs API client bound to the authenticated user's namespace
pub struct JobsClient {
    hub: HubClient,
    user: String,
}

impl JobsClient {
    /// Resolves the caller identity; jobs are namespaced by user
    pub async fn connect(hub: HubClient) -> Result<Self> {
        let user = hub.whoami().await?;
        Ok(Self { hub, user })
    }

    fn jobs_url(&self) -> String {
        format!("{}/api/jobs/{}", self.hub.endpoint(), self.user)
    }

    /// Creates the job and returns its id
    pub async fn submit(&self, spec: &JobSpec) -> Result<String> {
        tracing::debug!(?spec, "submitting job");
        let response = self.hub.post(&self.jobs_url())?.json(spec).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(HfJobsError::Authentication(format!(
                "the jobs API rejected the token ({})",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HfJobsError::Submission { status, body });
        }

        let job: JobInfo = response.json().await?;
        let job_id = job.job_id().ok_or_else(|| HfJobsError::Submission {
            status,
            body: "response did not include a job id".to_string(),
        })?;
        tracing::info!(job_id, "job submitted");
        Ok(job_id.to_string())
    }

    pub async fn list(&self) -> Result<Vec<JobInfo>> {
        let response = self.hub.get(&self.jobs_url())?.send().await?;
        let response = check_response(response, "jobs").await?;
        Ok(response.json().await?)
    }
}

impl JobApi for JobsClient {
    async fn follow_logs<F>(&self, job_id: &str, mut on_line: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let url = format!("{}/{}/logs-stream", self.jobs_url(), job_id);
        let response = self
            .hub
            .get_streaming(&url)?
            .header("accept", "text/event-stream")
            .send()
            .await?;
        let mut response = check_response(response, job_id).await?;

        let mut pending: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            pending.extend_from_slice(&chunk);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                on_line(line.trim_end_matches(['\n', '\r']))?;
            }
        }
        if !pending.is_empty() {
            let line = String::from_utf8_lossy(&pending);
            on_line(line.trim_end_matches('\r'))?;
        }
        Ok(())
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let url = format!("{}/{}", self.jobs_url(), job_id);
        let response = self.hub.get(&url)?.send().await?;
        let response = check_response(response, job_id).await?;
        let job: JobInfo = response.json().await?;
        Ok(job.status.unwrap_or(JobStatus {
            stage: JobStage::Unknown,
            message: None,
            error: None,
        }))
    }
}

/// Parses repeated `KEY=VALUE` flags; quotes around the value are dropped
pub fn parse_env_pairs(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut env = BTreeMap::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            HfJobsError::InvalidArgument(format!("expected KEY=VALUE, got '{}'", pair))
        })?;
        let value = value.trim_matches('"').trim_matches('\'');
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}

/// Parses `90`, `90s`, `30m`, `2h` or `1d` into seconds
pub fn parse_timeout(value: &str) -> Result<u64> {
    let value = value.trim();
    let invalid = || HfJobsError::InvalidArgument(format!("invalid timeout '{}'", value));

    let (number, multiplier) = match value.char_indices().last() {
        Some((idx, 's')) => (&value[..idx], 1),
        Some((idx, 'm')) => (&value[..idx], 60),
        Some((idx, 'h')) => (&value[..idx], 3600),
        Some((idx, 'd')) => (&value[..idx], 86400),
        Some(_) => (value, 1),
        None => return Err(invalid()),
    };
    let number: f64 = number.parse().map_err(|_| invalid())?;
    if !number.is_finite() || number <= 0.0 {
        return Err(invalid());
    }
    match (number * multiplier as f64).round() as u64 {
        0 => Err(invalid()),
        seconds => Ok(seconds),
    }
}
