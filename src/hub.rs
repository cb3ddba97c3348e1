//! Client for Hub dataset repositories
//!
//! Scripts and READMEs live in dataset repos; this wraps the handful of
//! endpoints the CLI needs (identity, create, exists, upload, download).

use std::time::Duration;

use base64::Engine;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{HfJobsError, Result};

const USER_AGENT: &str = concat!("hfjobs/", env!("CARGO_PKG_VERSION"));

/// Timeout for plain request/response calls. Log streams are exempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct WhoAmI {
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    #[serde(rename = "type")]
    repo_type: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<&'a str>,
    private: bool,
}

/// One line of the NDJSON commit payload
#[derive(Debug, Serialize)]
struct CommitLine<'a, T> {
    key: &'a str,
    value: T,
}

#[derive(Debug, Serialize)]
struct CommitHeader<'a> {
    summary: String,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct CommitFile<'a> {
    content: String,
    path: &'a str,
    encoding: &'a str,
}

/// Authenticated handle on the Hub HTTP API
#[derive(Debug, Clone)]
pub struct HubClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HubClient {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Browser URL of a dataset repository
    pub fn dataset_url(&self, repo_id: &str) -> String {
        format!("{}/datasets/{}", self.endpoint, repo_id)
    }

    /// Raw download URL of a file in a dataset repository
    pub fn resolve_url(&self, repo_id: &str, path: &str) -> String {
        format!("{}/datasets/{}/resolve/main/{}", self.endpoint, repo_id, path)
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            HfJobsError::Authentication(
                "no token found; pass --token, set HF_TOKEN or run `huggingface-cli login`"
                    .to_string(),
            )
        })
    }

    /// Starts an authenticated GET without a total timeout (used for streams)
    pub(crate) fn get_streaming(&self, url: &str) -> Result<RequestBuilder> {
        Ok(self.http.get(url).bearer_auth(self.token()?))
    }

    pub(crate) fn get(&self, url: &str) -> Result<RequestBuilder> {
        Ok(self.get_streaming(url)?.timeout(REQUEST_TIMEOUT))
    }

    pub(crate) fn post(&self, url: &str) -> Result<RequestBuilder> {
        Ok(self
            .http
            .post(url)
            .bearer_auth(self.token()?)
            .timeout(REQUEST_TIMEOUT))
    }

    /// Resolves the user owning the token
    pub async fn whoami(&self) -> Result<String> {
        let url = format!("{}/api/whoami-v2", self.endpoint);
        let response = self.get(&url)?.send().await?;
        let response = check_response(response, "account").await?;
        let who: WhoAmI = response.json().await?;
        tracing::debug!(user = %who.name, "resolved caller identity");
        Ok(who.name)
    }

    /// Creates a dataset repository. With `exist_ok`, an existing repo is not an error.
    pub async fn create_repo(&self, repo_id: &str, private: bool, exist_ok: bool) -> Result<()> {
        let (organization, name) = match repo_id.split_once('/') {
            Some((owner, name)) => (Some(owner), name),
            None => (None, repo_id),
        };
        let request = CreateRepoRequest {
            repo_type: "dataset",
            name,
            organization,
            private,
        };

        let url = format!("{}/api/repos/create", self.endpoint);
        let response = self.post(&url)?.json(&request).send().await?;

        if response.status() == StatusCode::CONFLICT {
            if exist_ok {
                tracing::debug!(repo = repo_id, "repository already exists, reusing it");
                return Ok(());
            }
            return Err(HfJobsError::AlreadyExists(repo_id.to_string()));
        }
        check_response(response, repo_id).await?;
        tracing::info!(repo = repo_id, private, "created dataset repository");
        Ok(())
    }

    /// Returns whether the dataset repository exists and is visible to the caller
    pub async fn repo_exists(&self, repo_id: &str) -> Result<bool> {
        let url = format!("{}/api/datasets/{}", self.endpoint, repo_id);
        let response = self.get(&url)?.send().await?;
        match check_response(response, repo_id).await {
            Ok(_) => Ok(true),
            Err(HfJobsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Writes `content` to `path_in_repo` on the main branch, replacing any previous version
    pub async fn upload_file(&self, repo_id: &str, path_in_repo: &str, content: &[u8]) -> Result<()> {
        let body = commit_payload(path_in_repo, content)?;
        let url = format!("{}/api/datasets/{}/commit/main", self.endpoint, repo_id);
        let response = self
            .post(&url)?
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        check_response(response, repo_id).await?;
        tracing::debug!(repo = repo_id, path = path_in_repo, bytes = content.len(), "uploaded file");
        Ok(())
    }

    /// Fetches a text file from the main branch
    pub async fn download_file(&self, repo_id: &str, path: &str) -> Result<String> {
        let url = self.resolve_url(repo_id, path);
        let response = self.get(&url)?.send().await?;
        let response = check_response(response, &format!("{}/{}", repo_id, path)).await?;
        Ok(response.text().await?)
    }
}

/// NDJSON body of a single-file commit: a header line then the base64 file line
pub(crate) fn commit_payload(path_in_repo: &str, content: &[u8]) -> Result<String> {
    let header = CommitLine {
        key: "header",
        value: CommitHeader {
            summary: format!("Upload {} with hfjobs", path_in_repo),
            description: "",
        },
    };
    let file = CommitLine {
        key: "file",
        value: CommitFile {
            content: base64::engine::general_purpose::STANDARD.encode(content),
            path: path_in_repo,
            encoding: "base64",
        },
    };
    Ok(format!(
        "{}\n{}\n",
        serde_json::to_string(&header)?,
        serde_json::to_string(&file)?
    ))
}

/// Maps non-2xx responses onto the error taxonomy
pub(crate) async fn check_response(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED => Err(HfJobsError::Authentication(format!(
            "the Hub rejected the token ({})",
            status
        ))),
        StatusCode::NOT_FOUND => Err(HfJobsError::NotFound(what.to_string())),
        _ => Err(HfJobsError::Api { status, body }),
    }
}

/// Prefixes an unqualified repository name with its owner
pub fn qualify_repo_id(repo: &str, owner: &str) -> String {
    if repo.contains('/') {
        repo.to_string()
    } else {
        format!("{}/{}", owner, repo)
    }
}

/// Like [`qualify_repo_id`], resolving the owner only when it is needed
pub async fn resolve_repo_id(hub: &HubClient, repo: &str) -> Result<String> {
    if repo.contains('/') {
        return Ok(repo.to_string());
    }
    let owner = hub.whoami().await?;
    Ok(qualify_repo_id(repo, &owner))
}

/// The part of a repository id after the owner
pub fn short_name(repo_id: &str) -> &str {
    repo_id.rsplit('/').next().unwrap_or(repo_id)
}
