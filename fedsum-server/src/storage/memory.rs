//! In-memory storage backend.
//!
//! Backs both storage traits with maps behind a mutex. This is the backend
//! the coordinator binary runs with; all state is lost on restart.

use std::{
    collections::HashMap,
    sync::Arc,
};

use anyhow::anyhow;
use sodiumoxide::crypto::hash::sha256;
use tokio::sync::Mutex;

use crate::{
    project::{Project, ProjectId, ProjectStatus, Round, Submission},
    storage::{
        ArtifactStorage,
        ProjectStorage,
        StorageResult,
        SubmissionAdd,
        SubmissionAddError,
    },
};

#[derive(Clone, Default)]
/// An in-memory project store.
pub struct ProjectStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    projects: HashMap<ProjectId, Project>,
    rounds: HashMap<(ProjectId, u32), Round>,
    submissions: HashMap<(ProjectId, u32), Vec<Submission>>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStorage for ProjectStore {
    async fn next_project_id(&mut self) -> StorageResult<ProjectId> {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        Ok(ProjectId::from(inner.next_id))
    }

    async fn insert_project(&mut self, project: &Project) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn project(&mut self, id: ProjectId) -> StorageResult<Option<Project>> {
        let inner = self.inner.lock().await;
        Ok(inner.projects.get(&id).cloned())
    }

    async fn set_project_status(
        &mut self,
        id: ProjectId,
        status: ProjectStatus,
    ) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        let project = inner
            .projects
            .get_mut(&id)
            .ok_or_else(|| anyhow!("no such project: {}", id))?;
        project.status = status;
        Ok(())
    }

    async fn round(&mut self, id: ProjectId, round_number: u32) -> StorageResult<Option<Round>> {
        let inner = self.inner.lock().await;
        Ok(inner.rounds.get(&(id, round_number)).cloned())
    }

    async fn open_round(&mut self, round: &Round) -> StorageResult<()> {
        // one lock guards both the round insert and the current-round bump
        let mut inner = self.inner.lock().await;
        let project = inner
            .projects
            .get_mut(&round.project_id)
            .ok_or_else(|| anyhow!("no such project: {}", round.project_id))?;
        project.current_round = round.round_number;
        inner
            .rounds
            .insert((round.project_id, round.round_number), round.clone());
        Ok(())
    }

    async fn add_submission(&mut self, submission: &Submission) -> StorageResult<SubmissionAdd> {
        // one lock guards both the duplicate check and the insert
        let mut inner = self.inner.lock().await;
        let round = inner
            .submissions
            .entry((submission.project_id, submission.round_number))
            .or_insert_with(Vec::new);
        if round
            .iter()
            .any(|existing| existing.participant == submission.participant)
        {
            return Ok(SubmissionAdd(Err(SubmissionAddError::DuplicateSubmission)));
        }
        round.push(submission.clone());
        Ok(SubmissionAdd(Ok(())))
    }

    async fn submissions(
        &mut self,
        id: ProjectId,
        round_number: u32,
    ) -> StorageResult<Vec<Submission>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .submissions
            .get(&(id, round_number))
            .cloned()
            .unwrap_or_default())
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
/// An in-memory content-addressed artifact store.
pub struct ArtifactStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the link of an artifact from its content.
    pub fn link_for(content: &[u8]) -> String {
        hex::encode(sha256::hash(content).as_ref())
    }
}

#[async_trait]
impl ArtifactStorage for ArtifactStore {
    async fn upload(&mut self, content: &[u8]) -> StorageResult<String> {
        let link = Self::link_for(content);
        let mut objects = self.objects.lock().await;
        objects.insert(link.clone(), content.to_vec());
        Ok(link)
    }

    async fn download(&mut self, link: &str) -> StorageResult<Option<Vec<u8>>> {
        let objects = self.objects.lock().await;
        Ok(objects.get(link).cloned())
    }

    async fn is_ready(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use num::bigint::BigUint;

    use super::*;
    use fedsum_core::model::ShapeDescriptor;

    fn project(id: u64) -> Project {
        Project {
            id: ProjectId::from(id),
            name: format!("project-{}", id),
            g: BigUint::from(100_160_064_u64),
            n: BigUint::from(100_160_063_u64),
            status: ProjectStatus::Pending,
            current_round: 0,
            maximum_rounds: 2,
            initial_global_model: "initial".to_string(),
            shape: ShapeDescriptor::new(),
            participants: BTreeSet::new(),
        }
    }

    fn submission(project_id: u64, round_number: u32, participant: &str) -> Submission {
        Submission {
            project_id: ProjectId::from(project_id),
            round_number,
            participant: participant.into(),
            encrypted_parameters: vec![BigUint::from(1_u8)].into(),
            artifact_link: format!("link-{}", participant),
        }
    }

    #[tokio::test]
    async fn test_project_round_trip() {
        let mut store = ProjectStore::new();
        let stored = project(1);
        store.insert_project(&stored).await.unwrap();
        assert_eq!(store.project(stored.id).await.unwrap(), Some(stored.clone()));
        assert_eq!(store.project(ProjectId::from(2)).await.unwrap(), None);

        store
            .set_project_status(stored.id, ProjectStatus::Running)
            .await
            .unwrap();
        let reloaded = store.project(stored.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProjectStatus::Running);
    }

    #[tokio::test]
    async fn test_next_project_id_is_monotonic() {
        let mut store = ProjectStore::new();
        let first = store.next_project_id().await.unwrap();
        let second = store.next_project_id().await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_open_round_bumps_current_round() {
        let mut store = ProjectStore::new();
        store.insert_project(&project(1)).await.unwrap();

        let round = Round {
            project_id: ProjectId::from(1),
            round_number: 1,
            global_model_link: "initial".to_string(),
        };
        store.open_round(&round).await.unwrap();

        assert_eq!(store.round(round.project_id, 1).await.unwrap(), Some(round));
        let reloaded = store.project(ProjectId::from(1)).await.unwrap().unwrap();
        assert_eq!(reloaded.current_round, 1);
    }

    #[tokio::test]
    async fn test_open_round_without_project_fails() {
        let mut store = ProjectStore::new();
        let round = Round {
            project_id: ProjectId::from(99),
            round_number: 1,
            global_model_link: "initial".to_string(),
        };
        assert!(store.open_round(&round).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_rejected() {
        let mut store = ProjectStore::new();
        store.insert_project(&project(1)).await.unwrap();

        let first = store.add_submission(&submission(1, 1, "alice")).await.unwrap();
        assert!(first.into_inner().is_ok());

        let second = store.add_submission(&submission(1, 1, "alice")).await.unwrap();
        assert_eq!(
            second.into_inner(),
            Err(SubmissionAddError::DuplicateSubmission)
        );

        // a different round is a fresh slate
        let next_round = store.add_submission(&submission(1, 2, "alice")).await.unwrap();
        assert!(next_round.into_inner().is_ok());

        let stored = store.submissions(ProjectId::from(1), 1).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_racing_duplicate_submissions_yield_one_success() {
        let mut store = ProjectStore::new();
        store.insert_project(&project(1)).await.unwrap();

        let mut left = store.clone();
        let mut right = store.clone();
        let (first, second) = tokio::join!(
            tokio::spawn(async move { left.add_submission(&submission(1, 1, "alice")).await }),
            tokio::spawn(async move { right.add_submission(&submission(1, 1, "alice")).await }),
        );
        let outcomes = [
            first.unwrap().unwrap().into_inner(),
            second.unwrap().unwrap().into_inner(),
        ];
        assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);

        let stored = store.submissions(ProjectId::from(1), 1).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_artifact_store_is_content_addressed() {
        let mut store = ArtifactStore::new();
        let link = store.upload(b"aggregate").await.unwrap();
        assert_eq!(link, ArtifactStore::link_for(b"aggregate"));

        // idempotent re-upload
        assert_eq!(store.upload(b"aggregate").await.unwrap(), link);
        assert_ne!(store.upload(b"other").await.unwrap(), link);

        assert_eq!(
            store.download(&link).await.unwrap(),
            Some(b"aggregate".to_vec())
        );
        assert_eq!(store.download("missing").await.unwrap(), None);
    }
}
