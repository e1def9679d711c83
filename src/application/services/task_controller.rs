//! Download job orchestration
//!
//! A [`TaskController`] takes a comic id from validation through admission,
//! download, PDF assembly and delivery, and always cleans up afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::application::errors::{AssemblyError, ConfigError, JobError};
use crate::application::services::admission::AdmissionGate;
use crate::domain::entities::{Artifact, FailureReason, Job, JobEvent, JobOutcome, JobState};
use crate::domain::traits::{ComicDownloader, JobSink};
use crate::infrastructure::config::JmConfig;
use crate::infrastructure::pdf::PdfAssembler;

/// Per-job knobs resolved from [`JmConfig`]
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub download_dir: PathBuf,
    pub file_prefix: String,
    pub timeout: Option<Duration>,
    /// Zero disables the size ceiling
    pub max_file_size_mb: f64,
    pub keep_images: bool,
    pub keep_pdf: bool,
}

impl JobSettings {
    pub fn from_config(config: &JmConfig) -> Result<Self, ConfigError> {
        let timeout = (config.task_timeout_minutes > 0)
            .then(|| Duration::from_secs(config.task_timeout_minutes as u64 * 60));
        Ok(Self {
            download_dir: config.resolve_download_dir()?,
            file_prefix: config.file_prefix.clone(),
            timeout,
            max_file_size_mb: config.max_file_size_mb,
            keep_images: config.keep_images,
            keep_pdf: config.keep_pdf,
        })
    }

    pub fn artifact_name(&self, comic_id: &str) -> String {
        format!("{}_{}.pdf", self.file_prefix, comic_id)
    }

    pub fn artifact_path(&self, comic_id: &str) -> PathBuf {
        self.download_dir.join(self.artifact_name(comic_id))
    }

    fn exceeds_limit(&self, size_mb: f64) -> bool {
        self.max_file_size_mb > 0.0 && size_mb > self.max_file_size_mb
    }
}

/// Runs download jobs under a shared concurrency limit
pub struct TaskController {
    settings: JobSettings,
    gate: AdmissionGate,
    downloader: Arc<dyn ComicDownloader>,
    assembler: PdfAssembler,
}

impl TaskController {
    pub fn new(
        settings: JobSettings,
        downloader: Arc<dyn ComicDownloader>,
        assembler: PdfAssembler,
        concurrency_limit: i64,
    ) -> Self {
        Self {
            settings,
            gate: AdmissionGate::new(concurrency_limit),
            downloader,
            assembler,
        }
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Comic ids are non-empty strings of ASCII digits
    pub fn validate_id(comic_id: &str) -> Result<(), JobError> {
        if !comic_id.is_empty() && comic_id.bytes().all(|b| b.is_ascii_digit()) {
            Ok(())
        } else {
            Err(JobError::InvalidId(comic_id.to_string()))
        }
    }

    /// Run one job to completion
    ///
    /// Returns `Err` only when the job never started: a malformed id or a
    /// download directory that cannot be created. Everything after that is
    /// reported through the returned [`JobOutcome`].
    pub async fn run(&self, comic_id: &str, sink: &dyn JobSink) -> Result<JobOutcome, JobError> {
        Self::validate_id(comic_id)?;

        let artifact_path = self.settings.artifact_path(comic_id);
        if let Ok(meta) = tokio::fs::metadata(&artifact_path).await {
            if meta.is_file() {
                return Ok(self.deliver_cached(comic_id, artifact_path, meta.len(), sink).await);
            }
        }

        tokio::fs::create_dir_all(&self.settings.download_dir)
            .await
            .map_err(JobError::Workspace)?;

        let _admission = if self.gate.is_saturated() {
            let position = self.gate.enqueue();
            tracing::info!(comic_id, position, "download queue full, waiting");
            sink.progress(JobEvent::Queued { position }).await;
            let admission = self.gate.acquire().await;
            self.gate.dequeue();
            sink.progress(JobEvent::Started {
                comic_id: comic_id.to_string(),
                waited: true,
            })
            .await;
            admission
        } else {
            let admission = self.gate.acquire().await;
            sink.progress(JobEvent::Started {
                comic_id: comic_id.to_string(),
                waited: false,
            })
            .await;
            admission
        };

        let work_dir = self.settings.download_dir.join(format!(
            "{}_{}_{}",
            self.settings.file_prefix,
            comic_id,
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        ));
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(JobError::Workspace)?;

        let mut job = Job::new(comic_id, work_dir, artifact_path)
            .with_timeout(self.settings.timeout)
            .with_retention(self.settings.keep_images, self.settings.keep_pdf);

        let started = Instant::now();
        let outcome = self.process(&mut job, sink).await;
        match &outcome {
            JobOutcome::Delivered(artifact) => tracing::info!(
                comic_id,
                size_mb = format!("{:.2}", artifact.size_mb()),
                partial = artifact.partial,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "comic delivered"
            ),
            JobOutcome::Failed(reason) => tracing::warn!(comic_id, %reason, "job failed"),
            JobOutcome::Refused { .. } => {}
        }

        cleanup(&mut job).await;
        Ok(outcome)
    }

    async fn deliver_cached(
        &self,
        comic_id: &str,
        path: PathBuf,
        size_bytes: u64,
        sink: &dyn JobSink,
    ) -> JobOutcome {
        let artifact = Artifact {
            path,
            file_name: self.settings.artifact_name(comic_id),
            size_bytes,
            partial: false,
            cached: true,
        };
        tracing::info!(comic_id, path = %artifact.path.display(), "using existing pdf");
        sink.progress(JobEvent::CachedArtifact).await;

        let size_mb = artifact.size_mb();
        if self.settings.exceeds_limit(size_mb) {
            return JobOutcome::Refused {
                size_mb,
                limit_mb: self.settings.max_file_size_mb,
            };
        }

        match sink.deliver(&artifact).await {
            Ok(()) => JobOutcome::Delivered(artifact),
            Err(e) => JobOutcome::Failed(FailureReason::Delivery(e.to_string())),
        }
    }

    async fn process(&self, job: &mut Job, sink: &dyn JobSink) -> JobOutcome {
        job.transition(JobState::Downloading);
        let download = self.downloader.download(&job.comic_id, &job.work_dir);
        let result = match job.timeout {
            Some(limit) => tokio::time::timeout(limit, download).await.ok(),
            None => Some(download.await),
        };

        let timed_out = match result {
            Some(Ok(())) => {
                sink.progress(JobEvent::Downloaded).await;
                false
            }
            Some(Err(e)) => {
                tracing::error!(comic_id = %job.comic_id, error = %e, "download failed");
                job.transition(JobState::Failed);
                return JobOutcome::Failed(FailureReason::Download(e.to_string()));
            }
            None => {
                let minutes = job.timeout.map(|t| t.as_secs() / 60).unwrap_or_default();
                tracing::warn!(comic_id = %job.comic_id, minutes, "download timed out, converting what arrived");
                job.transition(JobState::TimedOut);
                sink.progress(JobEvent::TimedOut { minutes }).await;
                true
            }
        };

        job.transition(JobState::Converting);
        let staging = job.staging_path();
        if let Err(e) = self.assembler.assemble(&job.work_dir, &staging).await {
            job.transition(JobState::Failed);
            remove_partial_output(&staging).await;
            let reason = match e {
                AssemblyError::NoImages(_) if timed_out => FailureReason::NoImagesAfterTimeout,
                AssemblyError::NoImages(_) => FailureReason::NoImages,
                other => FailureReason::Conversion(other.to_string()),
            };
            return JobOutcome::Failed(reason);
        }

        let size_bytes = match tokio::fs::metadata(&staging).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            Ok(_) => {
                job.transition(JobState::Failed);
                remove_partial_output(&staging).await;
                return JobOutcome::Failed(FailureReason::Conversion("generated pdf is empty".into()));
            }
            Err(e) => {
                job.transition(JobState::Failed);
                return JobOutcome::Failed(FailureReason::Conversion(e.to_string()));
            }
        };

        // work_dir is under download_dir, so the rename is atomic
        if let Err(e) = tokio::fs::rename(&staging, &job.artifact_path).await {
            tracing::error!(comic_id = %job.comic_id, error = %e, "failed to move pdf into place");
            job.transition(JobState::Failed);
            remove_partial_output(&staging).await;
            return JobOutcome::Failed(FailureReason::Conversion(e.to_string()));
        }

        let artifact = Artifact {
            path: job.artifact_path.clone(),
            file_name: self.settings.artifact_name(&job.comic_id),
            size_bytes,
            partial: timed_out,
            cached: false,
        };

        let size_mb = artifact.size_mb();
        if self.settings.exceeds_limit(size_mb) {
            sink.progress(JobEvent::Oversize {
                size_mb,
                limit_mb: self.settings.max_file_size_mb,
            })
            .await;
        }
        sink.progress(JobEvent::Ready {
            size_mb,
            partial: timed_out,
        })
        .await;

        if let Err(e) = sink.deliver(&artifact).await {
            tracing::error!(comic_id = %job.comic_id, error = %e, "failed to send pdf");
            job.transition(JobState::Failed);
            return JobOutcome::Failed(FailureReason::Delivery(e.to_string()));
        }
        if timed_out {
            sink.progress(JobEvent::PartialNotice).await;
        }

        job.transition(JobState::Delivered);
        JobOutcome::Delivered(artifact)
    }
}

async fn remove_partial_output(path: &Path) {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove incomplete pdf");
        }
    }
}

/// Remove the work directory and artifact unless retention says otherwise
async fn cleanup(job: &mut Job) {
    if !job.keep_images {
        if let Err(e) = tokio::fs::remove_dir_all(&job.work_dir).await {
            tracing::warn!(dir = %job.work_dir.display(), error = %e, "failed to remove download directory");
        }
    }
    if !job.keep_pdf && tokio::fs::try_exists(&job.artifact_path).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_file(&job.artifact_path).await {
            tracing::warn!(path = %job.artifact_path.display(), error = %e, "failed to remove pdf");
        }
    }
    job.transition(JobState::CleanedUp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id() {
        assert!(TaskController::validate_id("350234").is_ok());
        assert!(TaskController::validate_id("").is_err());
        assert!(TaskController::validate_id("12a").is_err());
        assert!(TaskController::validate_id("../1").is_err());
        assert!(TaskController::validate_id(" 12").is_err());
    }

    #[test]
    fn test_settings_from_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = JmConfig {
            download_dir: tmp.path().to_path_buf(),
            task_timeout_minutes: 0,
            ..JmConfig::default()
        };
        let settings = JobSettings::from_config(&config).unwrap();
        assert_eq!(settings.timeout, None);
        assert_eq!(settings.artifact_path("42"), tmp.path().join("jm_42.pdf"));

        let config = JmConfig {
            download_dir: tmp.path().to_path_buf(),
            task_timeout_minutes: 2,
            ..JmConfig::default()
        };
        let settings = JobSettings::from_config(&config).unwrap();
        assert_eq!(settings.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_size_limit_zero_disables() {
        let mut settings = JobSettings {
            download_dir: PathBuf::from("unused"),
            file_prefix: "jm".into(),
            timeout: None,
            max_file_size_mb: 0.0,
            keep_images: false,
            keep_pdf: false,
        };
        assert!(!settings.exceeds_limit(10_000.0));
        settings.max_file_size_mb = 1.5;
        assert!(settings.exceeds_limit(1.6));
        assert!(!settings.exceeds_limit(1.5));
    }
}
