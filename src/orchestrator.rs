//! Ties one run together: user data, a fresh tab, the executor, the job.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::brain::Brain;
use crate::config::RunSettings;
use crate::error::Result;
use crate::executor::{ActionExecutor, RunReport};
use crate::hands::{BrowserProvider, PageDriver};
use crate::jobs::{JobStatus, JobTracker};
use crate::types::UserRecord;
use crate::user_data::UserDataSource;

/// Handle for a run that has been accepted and is executing in the
/// background.
pub struct RunTicket {
    pub job_id: String,
    pub task: JoinHandle<()>,
}

pub struct Orchestrator {
    browser: Arc<dyn BrowserProvider>,
    brain: Brain,
    user_data: Arc<dyn UserDataSource>,
    jobs: Arc<JobTracker>,
    settings: RunSettings,
}

impl Orchestrator {
    pub fn new(
        browser: Arc<dyn BrowserProvider>,
        brain: Brain,
        user_data: Arc<dyn UserDataSource>,
        jobs: Arc<JobTracker>,
        settings: RunSettings,
    ) -> Self {
        Self {
            browser,
            brain,
            user_data,
            jobs,
            settings,
        }
    }

    pub fn jobs(&self) -> &Arc<JobTracker> {
        &self.jobs
    }

    /// Create a pending job and start automating `url` on a background task.
    /// Returns as soon as the job exists.
    ///
    /// The run itself executes on its own task, watched by the task in the
    /// returned ticket, so a panicking run still leaves the job in `error`.
    pub async fn start_run(self: &Arc<Self>, url: &str) -> RunTicket {
        let job_id = self.jobs.create().await;
        let this = Arc::clone(self);
        let id = job_id.clone();
        let url = url.to_string();
        let worker = tokio::spawn(async move { this.drive(&id, &url).await });

        let jobs = Arc::clone(&self.jobs);
        let id = job_id.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = worker.await {
                error!(job_id = %id, error = %e, "run task aborted");
                let detail = format!("run aborted: {e}");
                if let Err(e) = jobs.set_status(&id, JobStatus::Error, Some(detail)).await {
                    error!(job_id = %id, error = %e, "could not record aborted run");
                }
            }
        });
        RunTicket { job_id, task }
    }

    async fn drive(&self, job_id: &str, url: &str) {
        info!(job_id, url, "run started");
        let (status, result) = match self.run(job_id, url).await {
            Ok(report) => {
                info!(
                    job_id,
                    fills = report.fills,
                    clicks = report.clicks,
                    warnings = report.warnings.len(),
                    "run finished"
                );
                (JobStatus::Complete, report.summary())
            }
            Err(e) => {
                error!(job_id, error = %e, "run failed");
                (JobStatus::Error, e.to_string())
            }
        };
        if let Err(e) = self.jobs.set_status(job_id, status, Some(result)).await {
            error!(job_id, error = %e, "could not record run outcome");
        }
    }

    async fn run(&self, job_id: &str, url: &str) -> Result<RunReport> {
        let user = self.user_data.fetch().await?;
        let page = self.browser.open_page().await?;

        let outcome = self.run_on_page(job_id, page.as_ref(), url, &user).await;

        if self.settings.keep_pages_open {
            info!(job_id, "leaving tab open");
        } else if let Err(e) = page.close().await {
            warn!(job_id, error = %e, "failed to close tab");
        }
        outcome
    }

    async fn run_on_page(
        &self,
        job_id: &str,
        page: &dyn PageDriver,
        url: &str,
        user: &UserRecord,
    ) -> Result<RunReport> {
        page.navigate(url).await?;
        if let Err(e) = self.jobs.set_status(job_id, JobStatus::Running, None).await {
            warn!(job_id, error = %e, "could not mark job running");
        }
        ActionExecutor::new(page, &self.brain, user, &self.settings)
            .run()
            .await
    }

    pub async fn shutdown(&self) {
        self.browser.shutdown().await;
    }
}
