//! Submission intake and per-round bookkeeping.

use thiserror::Error;

use crate::{
    project::{ParticipantId, ProjectId, ProjectStatus, Round, Submission},
    storage::{Storage, StorageError},
};
use fedsum_core::paillier::EncryptedVector;

/// A participant submission as it arrives over the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub project_id: ProjectId,
    pub round_number: u32,
    pub participant: ParticipantId,
    /// Where the participant published its raw update.
    pub ipfs_link: String,
    pub encrypted_parameters: EncryptedVector,
}

/// A recorded submission, as reported to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionView {
    pub participant: ParticipantId,
    pub ipfs_link: String,
    pub encrypted_parameters: EncryptedVector,
}

impl From<Submission> for SubmissionView {
    fn from(submission: Submission) -> Self {
        Self {
            participant: submission.participant,
            ipfs_link: submission.artifact_link,
            encrypted_parameters: submission.encrypted_parameters,
        }
    }
}

/// The state of a round, as reported to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundDetail {
    #[serde(flatten)]
    pub round: Round,
    pub submissions: Vec<SubmissionView>,
    pub required_submissions: u64,
}

/// Error that can occur when handling a submission.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("project {0} does not exist")]
    ProjectNotFound(ProjectId),

    #[error("project {0} is not accepting submissions")]
    ProjectNotRunning(ProjectId),

    #[error("participant {0} is not registered for this project")]
    NotAParticipant(ParticipantId),

    #[error("round {round_number} of project {project_id} does not exist")]
    RoundNotFound {
        project_id: ProjectId,
        round_number: u32,
    },

    #[error("ciphertext length mismatch: expected {expected} components, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("the participant already submitted to this round")]
    DuplicateSubmission,

    #[error("storage request failed: {0}")]
    Storage(StorageError),
}

#[derive(Clone)]
/// Validates and records participant submissions.
pub struct SubmissionHandler<S> {
    store: S,
    min_submissions: u64,
}

impl<S> SubmissionHandler<S>
where
    S: Storage,
{
    pub fn new(store: S, min_submissions: u64) -> Self {
        Self {
            store,
            min_submissions,
        }
    }

    /// Validates a submission against its project and round and records it.
    ///
    /// The checks run in a fixed order: the project must exist and be
    /// running, the submitter must be a registered participant, the round
    /// must be the project's current round, and the ciphertext must have
    /// exactly one component per model parameter. Only then is the
    /// submission handed to storage, where the duplicate check happens
    /// atomically with the insert.
    pub async fn record_submission(
        &mut self,
        request: SubmissionRequest,
    ) -> Result<(), SubmissionError> {
        let project = self
            .store
            .project(request.project_id)
            .await
            .map_err(SubmissionError::Storage)?
            .ok_or(SubmissionError::ProjectNotFound(request.project_id))?;
        if project.status != ProjectStatus::Running {
            return Err(SubmissionError::ProjectNotRunning(project.id));
        }
        if !project.participants.contains(&request.participant) {
            return Err(SubmissionError::NotAParticipant(request.participant));
        }
        // only the current round is open for submissions; a past round is
        // as gone as a future one
        let round = self
            .store
            .round(request.project_id, request.round_number)
            .await
            .map_err(SubmissionError::Storage)?;
        if round.is_none() || request.round_number != project.current_round {
            return Err(SubmissionError::RoundNotFound {
                project_id: request.project_id,
                round_number: request.round_number,
            });
        }

        let expected = project.shape.parameter_count();
        let actual = request.encrypted_parameters.len();
        if actual != expected {
            return Err(SubmissionError::ShapeMismatch { expected, actual });
        }

        let submission = Submission {
            project_id: request.project_id,
            round_number: request.round_number,
            participant: request.participant,
            encrypted_parameters: request.encrypted_parameters,
            artifact_link: request.ipfs_link,
        };
        self.store
            .add_submission(&submission)
            .await
            .map_err(SubmissionError::Storage)?
            .into_inner()
            .map_err(|_| SubmissionError::DuplicateSubmission)?;

        info!(
            "accepted submission from {} for round {} of project {}",
            submission.participant, submission.round_number, submission.project_id,
        );
        Ok(())
    }

    /// The number of submissions recorded for a round.
    pub async fn submission_count(
        &mut self,
        project_id: ProjectId,
        round_number: u32,
    ) -> Result<u64, SubmissionError> {
        let submissions = self
            .store
            .submissions(project_id, round_number)
            .await
            .map_err(SubmissionError::Storage)?;
        Ok(submissions.len() as u64)
    }

    /// Whether a round has gathered enough submissions to be aggregated.
    pub async fn is_round_complete(
        &mut self,
        project_id: ProjectId,
        round_number: u32,
    ) -> Result<bool, SubmissionError> {
        let count = self.submission_count(project_id, round_number).await?;
        Ok(count >= self.min_submissions)
    }

    /// Returns a round together with its submission progress.
    pub async fn round_detail(
        &mut self,
        project_id: ProjectId,
        round_number: u32,
    ) -> Result<RoundDetail, SubmissionError> {
        self.store
            .project(project_id)
            .await
            .map_err(SubmissionError::Storage)?
            .ok_or(SubmissionError::ProjectNotFound(project_id))?;
        let round = self
            .store
            .round(project_id, round_number)
            .await
            .map_err(SubmissionError::Storage)?
            .ok_or(SubmissionError::RoundNotFound {
                project_id,
                round_number,
            })?;
        let submissions = self
            .store
            .submissions(project_id, round_number)
            .await
            .map_err(SubmissionError::Storage)?
            .into_iter()
            .map(SubmissionView::from)
            .collect();
        Ok(RoundDetail {
            round,
            submissions,
            required_submissions: self.min_submissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use num::bigint::BigUint;

    use super::*;
    use crate::{
        project::{Project, Round},
        storage::{memory_store, MemoryStore, ProjectStorage},
    };
    use fedsum_core::model::ShapeDescriptor;

    async fn running_project(store: &mut MemoryStore) -> Project {
        let mut shape = ShapeDescriptor::new();
        shape.insert("a".to_string(), vec![2]);
        shape.insert("b".to_string(), vec![1]);

        let mut participants = BTreeSet::new();
        participants.insert("alice".into());
        participants.insert("bob".into());

        let project = Project {
            id: ProjectId::from(1),
            name: "mnist".to_string(),
            g: BigUint::from(100_160_064_u64),
            n: BigUint::from(100_160_063_u64),
            status: ProjectStatus::Running,
            current_round: 1,
            maximum_rounds: 2,
            initial_global_model: "initial".to_string(),
            shape,
            participants,
        };
        store.insert_project(&project).await.unwrap();
        store
            .open_round(&Round {
                project_id: project.id,
                round_number: 1,
                global_model_link: "initial".to_string(),
            })
            .await
            .unwrap();
        project
    }

    fn request(participant: &str, components: usize) -> SubmissionRequest {
        SubmissionRequest {
            project_id: ProjectId::from(1),
            round_number: 1,
            participant: participant.into(),
            ipfs_link: format!("ipfs://{}", participant),
            encrypted_parameters: vec![BigUint::from(7_u8); components].into(),
        }
    }

    #[tokio::test]
    async fn test_accepts_a_valid_submission() {
        let mut store = memory_store();
        running_project(&mut store).await;
        let mut handler = SubmissionHandler::new(store, 2);

        handler.record_submission(request("alice", 3)).await.unwrap();
        assert_eq!(handler.submission_count(ProjectId::from(1), 1).await.unwrap(), 1);
        assert!(!handler.is_round_complete(ProjectId::from(1), 1).await.unwrap());

        handler.record_submission(request("bob", 3)).await.unwrap();
        assert!(handler.is_round_complete(ProjectId::from(1), 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_unknown_project() {
        let mut handler = SubmissionHandler::new(memory_store(), 2);
        let mut request = request("alice", 3);
        request.project_id = ProjectId::from(42);
        assert!(matches!(
            handler.record_submission(request).await,
            Err(SubmissionError::ProjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_project_that_is_not_running() {
        let mut store = memory_store();
        let project = running_project(&mut store).await;
        store
            .set_project_status(project.id, ProjectStatus::Completed)
            .await
            .unwrap();
        let mut handler = SubmissionHandler::new(store, 2);

        assert!(matches!(
            handler.record_submission(request("alice", 3)).await,
            Err(SubmissionError::ProjectNotRunning(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_unregistered_participant() {
        let mut store = memory_store();
        running_project(&mut store).await;
        let mut handler = SubmissionHandler::new(store, 2);

        assert!(matches!(
            handler.record_submission(request("mallory", 3)).await,
            Err(SubmissionError::NotAParticipant(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_unknown_round() {
        let mut store = memory_store();
        running_project(&mut store).await;
        let mut handler = SubmissionHandler::new(store, 2);

        let mut request = request("alice", 3);
        request.round_number = 2;
        assert!(matches!(
            handler.record_submission(request).await,
            Err(SubmissionError::RoundNotFound { round_number: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_a_round_that_is_no_longer_current() {
        let mut store = memory_store();
        let project = running_project(&mut store).await;
        store
            .open_round(&Round {
                project_id: project.id,
                round_number: 2,
                global_model_link: "aggregate".to_string(),
            })
            .await
            .unwrap();
        let mut handler = SubmissionHandler::new(store, 2);

        // round 1 still exists but only round 2 accepts submissions
        assert!(matches!(
            handler.record_submission(request("alice", 3)).await,
            Err(SubmissionError::RoundNotFound { round_number: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_mismatched_ciphertext_length() {
        let mut store = memory_store();
        running_project(&mut store).await;
        let mut handler = SubmissionHandler::new(store, 2);

        assert!(matches!(
            handler.record_submission(request("alice", 2)).await,
            Err(SubmissionError::ShapeMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_rejects_duplicate_submission() {
        let mut store = memory_store();
        running_project(&mut store).await;
        let mut handler = SubmissionHandler::new(store, 2);

        handler.record_submission(request("alice", 3)).await.unwrap();
        assert!(matches!(
            handler.record_submission(request("alice", 3)).await,
            Err(SubmissionError::DuplicateSubmission)
        ));
    }

    #[tokio::test]
    async fn test_round_detail_reports_progress() {
        let mut store = memory_store();
        running_project(&mut store).await;
        let mut handler = SubmissionHandler::new(store, 2);
        handler.record_submission(request("alice", 3)).await.unwrap();

        let detail = handler.round_detail(ProjectId::from(1), 1).await.unwrap();
        assert_eq!(detail.round.round_number, 1);
        assert_eq!(detail.round.global_model_link, "initial");
        assert_eq!(detail.submissions.len(), 1);
        assert_eq!(detail.submissions[0].participant, "alice".into());
        assert_eq!(detail.required_submissions, 2);

        assert!(matches!(
            handler.round_detail(ProjectId::from(1), 9).await,
            Err(SubmissionError::RoundNotFound { .. })
        ));
    }
}
