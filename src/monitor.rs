//! Follows a submitted job until it finishes
//!
//! Right after submission the log endpoint often returns an empty stream
//! because nothing has been buffered yet. The monitor alternates between
//! streaming and status checks until either logs show up or the job reaches
//! a terminal stage.

use std::io::Write;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::error::{HfJobsError, Result};
use crate::jobs::{parse_log_line, JobApi, JobStage, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Streaming,
    Checking,
    /// Logs were printed; wait for the status to settle before reporting
    Settling,
    Done,
}

/// Drives the STREAMING / CHECKING / DONE loop for one job
pub struct Monitor<'a, A> {
    api: &'a A,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl<'a, A: JobApi> Monitor<'a, A> {
    pub fn new(api: &'a A, poll_interval: Duration) -> Self {
        Self {
            api,
            poll_interval,
            max_wait: None,
        }
    }

    /// Stop with [`HfJobsError::MonitorTimeout`] once `max_wait` has elapsed
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Prints the job's logs to `out` and returns its final status.
    ///
    /// A non-completed final status is reported on `out` but is not an error
    /// here; callers decide how to exit.
    pub async fn watch<W: Write>(&self, job_id: &str, out: &mut W) -> Result<JobStatus> {
        let started = Instant::now();
        let mut phase = Phase::Streaming;
        let mut last_status = None;

        while phase != Phase::Done {
            tracing::debug!(job_id, ?phase, "monitor step");
            phase = match phase {
                Phase::Streaming => {
                    let printed = self.stream_once(job_id, out).await?;
                    if printed > 0 {
                        Phase::Settling
                    } else {
                        Phase::Checking
                    }
                }
                Phase::Checking | Phase::Settling => {
                    let status = self.api.status(job_id).await?;
                    let active = status.stage.is_active();
                    tracing::debug!(job_id, stage = %status.stage, "status check");
                    last_status = Some(status);

                    if !active {
                        Phase::Done
                    } else {
                        if let Some(max_wait) = self.max_wait {
                            if started.elapsed() >= max_wait {
                                return Err(HfJobsError::MonitorTimeout(job_id.to_string()));
                            }
                        }
                        sleep(self.poll_interval).await;
                        if phase == Phase::Checking {
                            Phase::Streaming
                        } else {
                            Phase::Settling
                        }
                    }
                }
                Phase::Done => Phase::Done,
            };
        }

        // Loop only exits after a status check
        let status = last_status.unwrap_or(JobStatus {
            stage: JobStage::Unknown,
            message: None,
            error: None,
        });
        if status.stage != JobStage::Completed {
            report_failure(&status, out)?;
        }
        Ok(status)
    }

    /// Opens the log stream once and returns how many real lines were printed
    async fn stream_once<W: Write>(&self, job_id: &str, out: &mut W) -> Result<usize> {
        let mut printed = 0;
        let result = self
            .api
            .follow_logs(job_id, |line| {
                let Some(event) = parse_log_line(line) else {
                    return Ok(());
                };
                if event.is_keepalive() {
                    return Ok(());
                }
                writeln!(out, "[{}] {}", event.timestamp, event.data)?;
                printed += 1;
                Ok(())
            })
            .await;

        match result {
            Ok(()) => {}
            // An interrupted or refused stream looks the same as an empty one: check status next
            Err(e @ (HfJobsError::Http(_) | HfJobsError::Api { .. } | HfJobsError::NotFound(_))) => {
                tracing::warn!(job_id, error = %e, "log stream unavailable");
            }
            Err(e) => return Err(e),
        }
        out.flush()?;
        Ok(printed)
    }
}

fn report_failure<W: Write>(status: &JobStatus, out: &mut W) -> Result<()> {
    writeln!(out, "Finished with an error ❌")?;
    writeln!(
        out,
        "{} ({})",
        status.message.as_deref().unwrap_or("Job did not complete"),
        status.error.as_deref().unwrap_or(&status.stage.to_string())
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Scripted stand-in for the jobs API
    #[derive(Default)]
    pub(crate) struct StubApi {
        /// One entry per stream opening; `Err(())` simulates an interrupted stream
        pub streams: RefCell<VecDeque<std::result::Result<Vec<String>, ()>>>,
        pub statuses: RefCell<VecDeque<JobStatus>>,
        pub stream_calls: RefCell<usize>,
        pub status_calls: RefCell<usize>,
    }

    pub(crate) fn status(stage: JobStage, message: Option<&str>, error: Option<&str>) -> JobStatus {
        JobStatus {
            stage,
            message: message.map(String::from),
            error: error.map(String::from),
        }
    }

    fn event(data: &str, timestamp: &str) -> String {
        format!(
            "data: {}",
            serde_json::json!({ "data": data, "timestamp": timestamp })
        )
    }

    impl JobApi for StubApi {
        async fn follow_logs<F>(&self, _job_id: &str, mut on_line: F) -> Result<()>
        where
            F: FnMut(&str) -> Result<()>,
        {
            *self.stream_calls.borrow_mut() += 1;
            let next = self.streams.borrow_mut().pop_front();
            match next {
                Some(Ok(lines)) => {
                    for line in &lines {
                        on_line(line)?;
                    }
                    Ok(())
                }
                Some(Err(())) => {
                    // Any reqwest error will do; an unparsable URL fails without touching the network
                    let err = reqwest::Client::new()
                        .get("not a url")
                        .send()
                        .await
                        .unwrap_err();
                    Err(HfJobsError::Http(err))
                }
                None => Ok(()),
            }
        }

        async fn status(&self, _job_id: &str) -> Result<JobStatus> {
            *self.status_calls.borrow_mut() += 1;
            let mut statuses = self.statuses.borrow_mut();
            // Repeat the last scripted status forever
            if statuses.len() > 1 {
                Ok(statuses.pop_front().unwrap())
            } else {
                Ok(statuses.front().cloned().unwrap())
            }
        }
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_without_logs() {
        let api = StubApi::default();
        api.statuses
            .borrow_mut()
            .push_back(status(JobStage::Completed, None, None));

        let mut out = Vec::new();
        let final_status = Monitor::new(&api, Duration::from_secs(1))
            .watch("job-1", &mut out)
            .await
            .unwrap();

        assert_eq!(final_status.stage, JobStage::Completed);
        assert_eq!(*api.stream_calls.borrow(), 1);
        assert_eq!(*api.status_calls.borrow(), 1);
        assert!(!output(out).contains("Finished with an error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_reports_code() {
        let api = StubApi::default();
        api.statuses.borrow_mut().push_back(status(
            JobStage::Error,
            Some("Job failed"),
            Some("OOM"),
        ));

        let mut out = Vec::new();
        let final_status = Monitor::new(&api, Duration::from_secs(1))
            .watch("job-1", &mut out)
            .await
            .unwrap();

        assert_eq!(final_status.stage, JobStage::Error);
        let text = output(out);
        assert!(text.contains("Finished with an error ❌"));
        assert!(text.contains("Job failed (OOM)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopens_stream_until_logs_arrive() {
        let api = StubApi::default();
        {
            let mut streams = api.streams.borrow_mut();
            streams.push_back(Ok(vec![event("===== Job started at 12:00 =====", "t0")]));
            streams.push_back(Ok(vec![]));
            streams.push_back(Ok(vec![
                ": keep-alive".to_string(),
                event("hello", "t1"),
                event("world", "t2"),
            ]));
        }
        {
            let mut statuses = api.statuses.borrow_mut();
            statuses.push_back(status(JobStage::Running, None, None));
            statuses.push_back(status(JobStage::Running, None, None));
            statuses.push_back(status(JobStage::Completed, None, None));
        }

        let mut out = Vec::new();
        let final_status = Monitor::new(&api, Duration::from_secs(1))
            .watch("job-1", &mut out)
            .await
            .unwrap();

        assert_eq!(final_status.stage, JobStage::Completed);
        assert_eq!(*api.stream_calls.borrow(), 3);
        assert_eq!(output(out), "[t1] hello\n[t2] world\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_stream_falls_back_to_status_check() {
        let api = StubApi::default();
        api.streams.borrow_mut().push_back(Err(()));
        api.statuses
            .borrow_mut()
            .push_back(status(JobStage::Completed, None, None));

        let mut out = Vec::new();
        let final_status = Monitor::new(&api, Duration::from_secs(1))
            .watch("job-1", &mut out)
            .await
            .unwrap();

        assert_eq!(final_status.stage, JobStage::Completed);
        assert_eq!(*api.status_calls.borrow(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_terminal_status_after_logs() {
        let api = StubApi::default();
        api.streams
            .borrow_mut()
            .push_back(Ok(vec![event("done", "t1")]));
        {
            let mut statuses = api.statuses.borrow_mut();
            statuses.push_back(status(JobStage::Running, None, None));
            statuses.push_back(status(JobStage::Completed, None, None));
        }

        let mut out = Vec::new();
        Monitor::new(&api, Duration::from_secs(1))
            .watch("job-1", &mut out)
            .await
            .unwrap();

        // The stream is not reopened once logs were printed
        assert_eq!(*api.stream_calls.borrow(), 1);
        assert_eq!(*api.status_calls.borrow(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_applies_after_logs() {
        let api = StubApi::default();
        api.streams
            .borrow_mut()
            .push_back(Ok(vec![event("still going", "t1")]));
        api.statuses
            .borrow_mut()
            .push_back(status(JobStage::Running, None, None));

        let mut out = Vec::new();
        let err = Monitor::new(&api, Duration::from_secs(1))
            .with_max_wait(Some(Duration::from_secs(3)))
            .watch("job-2", &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, HfJobsError::MonitorTimeout(ref id) if id == "job-2"));
        assert!(err.to_string().contains("still running after the configured deadline"));
        assert!(!err.to_string().contains("no logs"));
        assert_eq!(output(out), "[t1] still going\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_waiting() {
        let api = StubApi::default();
        api.statuses
            .borrow_mut()
            .push_back(status(JobStage::Running, None, None));

        let mut out = Vec::new();
        let err = Monitor::new(&api, Duration::from_secs(1))
            .with_max_wait(Some(Duration::from_secs(5)))
            .watch("job-9", &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, HfJobsError::MonitorTimeout(ref id) if id == "job-9"));
        assert!(*api.stream_calls.borrow() >= 5);
    }
}
