use async_trait::async_trait;
use crate::application::errors::BotError;
use crate::domain::entities::{Artifact, JobEvent};

/// Receives a job's progress and its finished artifact
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn progress(&self, event: JobEvent);

    /// Hand the artifact over; the file is only guaranteed to exist for the
    /// duration of this call
    async fn deliver(&self, artifact: &Artifact) -> Result<(), BotError>;
}
