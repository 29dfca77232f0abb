//! Storage API.

use derive_more::Deref;
use displaydoc::Display;
use thiserror::Error;

use crate::project::{Project, ProjectId, ProjectStatus, Round, Submission};

/// The error type for storage operations that are not directly related to the
/// application domain, for example connection failures or corrupted data.
pub type StorageError = anyhow::Error;

/// The result of a storage operation.
pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
/// An abstract project storage.
pub trait ProjectStorage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Reserves the next free project id.
    async fn next_project_id(&mut self) -> StorageResult<ProjectId>;

    /// Inserts a [`Project`], replacing any project with the same id.
    async fn insert_project(&mut self, project: &Project) -> StorageResult<()>;

    /// Returns the project with the given id.
    ///
    /// # Behavior
    ///
    /// - If the project does not exist, return `StorageResult::Ok(None)`.
    /// - If the project exists, return `StorageResult::Ok(Some(Project))`.
    async fn project(&mut self, id: ProjectId) -> StorageResult<Option<Project>>;

    /// Sets the lifecycle status of a project.
    ///
    /// # Behavior
    ///
    /// - If the project does not exist, return `StorageResult::Err(error)`.
    /// - If the project exists, set the status and return `StorageResult::Ok(())`.
    async fn set_project_status(
        &mut self,
        id: ProjectId,
        status: ProjectStatus,
    ) -> StorageResult<()>;

    /// Returns a round of a project.
    ///
    /// # Behavior
    ///
    /// - If the round does not exist, return `StorageResult::Ok(None)`.
    /// - If the round exists, return `StorageResult::Ok(Some(Round))`.
    async fn round(&mut self, id: ProjectId, round_number: u32) -> StorageResult<Option<Round>>;

    /// Opens a new round: inserts the [`Round`] and moves the project's
    /// current round to its number, as one atomic step.
    ///
    /// # Behavior
    ///
    /// - If the project does not exist, return `StorageResult::Err(error)`.
    /// - Otherwise insert the round, update the project and return
    ///   `StorageResult::Ok(())`.
    async fn open_round(&mut self, round: &Round) -> StorageResult<()>;

    /// Adds a participant submission to its round.
    ///
    /// # Behavior
    ///
    /// - If the submission has been successfully added, return
    ///   `StorageResult::Ok(SubmissionAdd)` containing a `Result::Ok(())`.
    /// - If the participant already submitted to this round, return the
    ///   corresponding `StorageResult::Ok(SubmissionAdd)` containing a
    ///   `Result::Err(SubmissionAddError)`. The duplicate check and the
    ///   insert are one atomic step.
    async fn add_submission(&mut self, submission: &Submission) -> StorageResult<SubmissionAdd>;

    /// Returns all submissions of a round, in insertion order.
    async fn submissions(
        &mut self,
        id: ProjectId,
        round_number: u32,
    ) -> StorageResult<Vec<Submission>>;

    /// Checks if the [`ProjectStorage`] is ready to process requests.
    async fn is_ready(&mut self) -> StorageResult<()>;
}

#[async_trait]
/// An abstract content-addressed artifact storage for published models.
pub trait ArtifactStorage
where
    Self: Clone + Send + Sync + 'static,
{
    /// Uploads an artifact and returns its content-derived link.
    ///
    /// # Behavior
    ///
    /// Uploading the same bytes twice returns the same link; the upload is
    /// idempotent.
    async fn upload(&mut self, content: &[u8]) -> StorageResult<String>;

    /// Downloads an artifact by its link.
    ///
    /// # Behavior
    ///
    /// - If the artifact does not exist, return `StorageResult::Ok(None)`.
    /// - If the artifact exists, return `StorageResult::Ok(Some(Vec<u8>))`.
    async fn download(&mut self, link: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Checks if the [`ArtifactStorage`] is ready to process requests.
    async fn is_ready(&mut self) -> StorageResult<()>;
}

#[async_trait]
pub trait Storage: ProjectStorage + ArtifactStorage {
    /// Checks if the [`ProjectStorage`] and [`ArtifactStorage`] are ready to
    /// process requests.
    async fn is_ready(&mut self) -> StorageResult<()>;
}

/// A wrapper that contains the result of the "add submission" operation.
#[derive(Deref)]
pub struct SubmissionAdd(pub(crate) Result<(), SubmissionAddError>);

impl SubmissionAdd {
    /// Unwraps this wrapper, returning the underlying result.
    pub fn into_inner(self) -> Result<(), SubmissionAddError> {
        self.0
    }
}

/// Error that can occur when adding a submission to a round.
#[derive(Display, Error, Debug, PartialEq, Eq)]
pub enum SubmissionAddError {
    /// the participant already submitted to this round
    DuplicateSubmission,
}
