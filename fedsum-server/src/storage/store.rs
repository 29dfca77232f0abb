//! A generic store.

use crate::{
    project::{Project, ProjectId, ProjectStatus, Round, Submission},
    storage::{ArtifactStorage, ProjectStorage, Storage, StorageResult, SubmissionAdd},
};

#[derive(Clone)]
/// A generic store.
pub struct Store<P, A>
where
    P: ProjectStorage,
    A: ArtifactStorage,
{
    /// A project store.
    project: P,
    /// An artifact store.
    artifact: A,
}

impl<P, A> Store<P, A>
where
    P: ProjectStorage,
    A: ArtifactStorage,
{
    /// Creates a new [`Store`].
    pub fn new(project: P, artifact: A) -> Self {
        Self { project, artifact }
    }
}

#[async_trait]
impl<P, A> ProjectStorage for Store<P, A>
where
    P: ProjectStorage,
    A: ArtifactStorage,
{
    async fn next_project_id(&mut self) -> StorageResult<ProjectId> {
        self.project.next_project_id().await
    }

    async fn insert_project(&mut self, project: &Project) -> StorageResult<()> {
        self.project.insert_project(project).await
    }

    async fn project(&mut self, id: ProjectId) -> StorageResult<Option<Project>> {
        self.project.project(id).await
    }

    async fn set_project_status(
        &mut self,
        id: ProjectId,
        status: ProjectStatus,
    ) -> StorageResult<()> {
        self.project.set_project_status(id, status).await
    }

    async fn round(&mut self, id: ProjectId, round_number: u32) -> StorageResult<Option<Round>> {
        self.project.round(id, round_number).await
    }

    async fn open_round(&mut self, round: &Round) -> StorageResult<()> {
        self.project.open_round(round).await
    }

    async fn add_submission(&mut self, submission: &Submission) -> StorageResult<SubmissionAdd> {
        self.project.add_submission(submission).await
    }

    async fn submissions(
        &mut self,
        id: ProjectId,
        round_number: u32,
    ) -> StorageResult<Vec<Submission>> {
        self.project.submissions(id, round_number).await
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        self.project.is_ready().await
    }
}

#[async_trait]
impl<P, A> ArtifactStorage for Store<P, A>
where
    P: ProjectStorage,
    A: ArtifactStorage,
{
    async fn upload(&mut self, content: &[u8]) -> StorageResult<String> {
        self.artifact.upload(content).await
    }

    async fn download(&mut self, link: &str) -> StorageResult<Option<Vec<u8>>> {
        self.artifact.download(link).await
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        self.artifact.is_ready().await
    }
}

#[async_trait]
impl<P, A> Storage for Store<P, A>
where
    P: ProjectStorage,
    A: ArtifactStorage,
{
    async fn is_ready(&mut self) -> StorageResult<()> {
        tokio::try_join!(self.project.is_ready(), self.artifact.is_ready()).map(|_| ())
    }
}
