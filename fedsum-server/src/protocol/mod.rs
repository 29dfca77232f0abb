//! Project registration and the round advancement protocol.
//!
//! Advancement is the only place where submissions are read back out of
//! storage: the current round's ciphertexts are folded into one encrypted
//! aggregate, the aggregate is published to artifact storage, and either
//! the next round opens on top of it or the project completes. Everything
//! in between, from the aggregation to the bookkeeping updates, runs under
//! a per-project lock so that two concurrent advancement requests cannot
//! both aggregate the same round.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex},
};

use num::bigint::BigUint;
use thiserror::Error;

use crate::{
    project::{ParticipantId, Project, ProjectId, ProjectStatus, Round},
    storage::{Storage, StorageError},
};
use fedsum_core::{
    model::ShapeDescriptor,
    paillier::{homomorphic_add, EncryptedVector, ShapeMismatchError},
};

/// Everything a project needs to be registered.
#[derive(Debug, Clone)]
pub struct ProjectSpec {
    pub name: String,
    pub g: BigUint,
    pub n: BigUint,
    pub maximum_rounds: u32,
    pub initial_global_model: String,
    pub shape: ShapeDescriptor,
    pub participants: BTreeSet<ParticipantId>,
}

/// The artifact published for an aggregated round.
///
/// The parameters inside are still encrypted; whoever downloads the
/// artifact needs the project's private key to read them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatePayload {
    pub model_name: String,
    pub round_number: u32,
    pub encrypted_parameters: EncryptedVector,
}

/// The outcome of one advancement step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The aggregate was published and the next round opened on top of it.
    Opened(Round),
    /// The aggregate was published and the project completed; no further
    /// round accepts submissions.
    Completed { artifact_link: String },
}

/// Error that can occur while registering a project or advancing a round.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("project {0} does not exist")]
    ProjectNotFound(ProjectId),

    #[error("project {0} has not been started yet")]
    ProjectNotRunning(ProjectId),

    #[error("project {0} has already been started")]
    ProjectAlreadyStarted(ProjectId),

    #[error("project {0} has already completed")]
    ProjectCompleted(ProjectId),

    #[error("invalid project: {0}")]
    InvalidProject(&'static str),

    #[error("round has {submissions} of {required} required submissions")]
    InsufficientSubmissions { submissions: u64, required: u64 },

    #[error("failed to aggregate submissions: {0}")]
    Aggregation(#[from] ShapeMismatchError),

    #[error("failed to package the aggregate: {0}")]
    Packaging(#[from] serde_json::Error),

    #[error("storage request failed: {0}")]
    Storage(StorageError),
}

#[derive(Clone)]
/// Drives projects through their round lifecycle.
pub struct RoundProtocol<S> {
    store: S,
    min_submissions: u64,
    locks: Arc<Mutex<HashMap<ProjectId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl<S> RoundProtocol<S>
where
    S: Storage,
{
    pub fn new(store: S, min_submissions: u64) -> Self {
        Self {
            store,
            min_submissions,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a new project in the `Pending` state.
    ///
    /// # Errors
    /// Fails if the project could never complete a round: zero rounds, an
    /// empty model shape, or fewer participants than a round requires.
    pub async fn register_project(&mut self, spec: ProjectSpec) -> Result<Project, ProtocolError> {
        if spec.maximum_rounds == 0 {
            return Err(ProtocolError::InvalidProject(
                "the project needs at least one round",
            ));
        }
        if spec.shape.is_empty() {
            return Err(ProtocolError::InvalidProject("the model shape is empty"));
        }
        if (spec.participants.len() as u64) < self.min_submissions {
            return Err(ProtocolError::InvalidProject(
                "fewer participants than a round requires",
            ));
        }

        let id = self
            .store
            .next_project_id()
            .await
            .map_err(ProtocolError::Storage)?;
        let project = Project {
            id,
            name: spec.name,
            g: spec.g,
            n: spec.n,
            status: ProjectStatus::Pending,
            current_round: 0,
            maximum_rounds: spec.maximum_rounds,
            initial_global_model: spec.initial_global_model,
            shape: spec.shape,
            participants: spec.participants,
        };
        self.store
            .insert_project(&project)
            .await
            .map_err(ProtocolError::Storage)?;
        info!("registered project {} ({})", project.id, project.name);
        Ok(project)
    }

    /// Starts a pending project by opening round one on its initial model.
    pub async fn create_first_round(
        &mut self,
        project_id: ProjectId,
    ) -> Result<Round, ProtocolError> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        let project = self.load_project(project_id).await?;
        match project.status {
            ProjectStatus::Pending => (),
            ProjectStatus::Running => {
                return Err(ProtocolError::ProjectAlreadyStarted(project_id))
            }
            ProjectStatus::Completed => return Err(ProtocolError::ProjectCompleted(project_id)),
        }

        self.store
            .set_project_status(project_id, ProjectStatus::Running)
            .await
            .map_err(ProtocolError::Storage)?;
        let round = Round {
            project_id,
            round_number: 1,
            global_model_link: project.initial_global_model,
        };
        self.store
            .open_round(&round)
            .await
            .map_err(ProtocolError::Storage)?;
        info!("opened round 1 of project {}", project_id);
        Ok(round)
    }

    /// Aggregates the current round and moves the project forward.
    ///
    /// The submissions of the current round are folded into one encrypted
    /// aggregate and published as an [`AggregatePayload`] artifact. If
    /// rounds remain, the next one opens with the artifact as its global
    /// model; otherwise the project completes. On any error, including too
    /// few submissions, the project is left untouched and the round keeps
    /// accepting submissions.
    pub async fn advance(&mut self, project_id: ProjectId) -> Result<Advance, ProtocolError> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        let project = self.load_project(project_id).await?;
        match project.status {
            ProjectStatus::Running => (),
            ProjectStatus::Pending => return Err(ProtocolError::ProjectNotRunning(project_id)),
            ProjectStatus::Completed => return Err(ProtocolError::ProjectCompleted(project_id)),
        }

        let round_number = project.current_round;
        let submissions = self
            .store
            .submissions(project_id, round_number)
            .await
            .map_err(ProtocolError::Storage)?;
        if (submissions.len() as u64) < self.min_submissions {
            return Err(ProtocolError::InsufficientSubmissions {
                submissions: submissions.len() as u64,
                required: self.min_submissions,
            });
        }

        let ciphertexts: Vec<EncryptedVector> = submissions
            .into_iter()
            .map(|submission| submission.encrypted_parameters)
            .collect();
        let aggregate = homomorphic_add(&ciphertexts, &project.n)?;

        let payload = AggregatePayload {
            model_name: project.name,
            round_number,
            encrypted_parameters: aggregate,
        };
        let artifact_link = self
            .store
            .upload(&serde_json::to_vec(&payload)?)
            .await
            .map_err(ProtocolError::Storage)?;
        info!(
            "aggregated round {} of project {} into {}",
            round_number, project_id, artifact_link,
        );

        let next = round_number + 1;
        if next > project.maximum_rounds {
            self.store
                .set_project_status(project_id, ProjectStatus::Completed)
                .await
                .map_err(ProtocolError::Storage)?;
            info!("project {} completed", project_id);
            Ok(Advance::Completed { artifact_link })
        } else {
            let round = Round {
                project_id,
                round_number: next,
                global_model_link: artifact_link,
            };
            self.store
                .open_round(&round)
                .await
                .map_err(ProtocolError::Storage)?;
            info!("opened round {} of project {}", next, project_id);
            Ok(Advance::Opened(round))
        }
    }

    async fn load_project(&mut self, project_id: ProjectId) -> Result<Project, ProtocolError> {
        self.store
            .project(project_id)
            .await
            .map_err(ProtocolError::Storage)?
            .ok_or(ProtocolError::ProjectNotFound(project_id))
    }

    fn project_lock(&self, project_id: ProjectId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}
