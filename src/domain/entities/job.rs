//! Download job entities

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Lifecycle of a download job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Downloading,
    TimedOut,
    Converting,
    Delivered,
    Failed,
    CleanedUp,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Downloading => "downloading",
            JobState::TimedOut => "timed_out",
            JobState::Converting => "converting",
            JobState::Delivered => "delivered",
            JobState::Failed => "failed",
            JobState::CleanedUp => "cleaned_up",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One comic download, from admission to cleanup
#[derive(Debug, Clone)]
pub struct Job {
    pub comic_id: String,
    pub work_dir: PathBuf,
    pub artifact_path: PathBuf,
    /// `None` means the download phase has no deadline
    pub timeout: Option<Duration>,
    pub keep_images: bool,
    pub keep_pdf: bool,
    state: JobState,
}

impl Job {
    pub fn new(comic_id: impl Into<String>, work_dir: PathBuf, artifact_path: PathBuf) -> Self {
        Self {
            comic_id: comic_id.into(),
            work_dir,
            artifact_path,
            timeout: None,
            keep_images: false,
            keep_pdf: false,
            state: JobState::Running,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retention(mut self, keep_images: bool, keep_pdf: bool) -> Self {
        self.keep_images = keep_images;
        self.keep_pdf = keep_pdf;
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Where the PDF is encoded before it is moved to `artifact_path`
    ///
    /// Lives inside `work_dir`, so an interrupted encode never leaves a file
    /// that looks like a finished artifact.
    pub fn staging_path(&self) -> PathBuf {
        let name = self
            .artifact_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.pdf", self.comic_id));
        self.work_dir.join(format!("{}.part", name))
    }

    pub fn transition(&mut self, next: JobState) {
        tracing::debug!(comic_id = %self.comic_id, from = %self.state, to = %next, "job state change");
        self.state = next;
    }
}

/// Produced (or previously produced) PDF handed to delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Attachment name shown to the user
    pub file_name: String,
    pub size_bytes: u64,
    /// Built from a download that hit its deadline
    pub partial: bool,
    /// Existed before the job was requested
    pub cached: bool,
}

impl Artifact {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Progress notifications emitted while a job runs
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// Gate is full; `position` jobs are ahead (best effort)
    Queued { position: usize },
    Started { comic_id: String, waited: bool },
    CachedArtifact,
    Downloaded,
    TimedOut { minutes: u64 },
    Oversize { size_mb: f64, limit_mb: f64 },
    Ready { size_mb: f64, partial: bool },
    /// Sent after a partial artifact was delivered
    PartialNotice,
}

/// Why a job ended without delivering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    NoImagesAfterTimeout,
    NoImages,
    Download(String),
    Conversion(String),
    Delivery(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoImagesAfterTimeout => write!(f, "download timed out with no images"),
            FailureReason::NoImages => write!(f, "no images to convert"),
            FailureReason::Download(e) => write!(f, "download failed: {}", e),
            FailureReason::Conversion(e) => write!(f, "conversion failed: {}", e),
            FailureReason::Delivery(e) => write!(f, "delivery failed: {}", e),
        }
    }
}

/// Terminal result of a job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Delivered(Artifact),
    /// Cached artifact exceeds the size ceiling and was not sent
    Refused { size_mb: f64, limit_mb: f64 },
    Failed(FailureReason),
}

impl JobOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, JobOutcome::Delivered(_))
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        match self {
            JobOutcome::Delivered(a) => Some(a),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_path_stays_in_work_dir() {
        let job = Job::new("7", PathBuf::from("/dl/.work_7"), PathBuf::from("/dl/jm_7.pdf"));
        assert_eq!(job.staging_path(), PathBuf::from("/dl/.work_7/jm_7.pdf.part"));
    }
}
