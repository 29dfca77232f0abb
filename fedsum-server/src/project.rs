//! The project, round and submission domain types.

use std::collections::BTreeSet;

use derive_more::{Display, From, Into};
use num::bigint::BigUint;

use fedsum_core::{model::ShapeDescriptor, paillier::EncryptedVector};

/// The unique identifier of a training project.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    From,
    Into,
    Serialize,
    Deserialize,
)]
pub struct ProjectId(u64);

/// The identifier a participant registers under.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    From,
    Into,
    Serialize,
    Deserialize,
)]
pub struct ParticipantId(String);

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The lifecycle state of a project.
///
/// A project starts out `Pending`, becomes `Running` when its first round
/// is opened and ends up `Completed` once the configured number of rounds
/// has been aggregated. The transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Pending,
    Running,
    Completed,
}

/// A training project.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    /// The Paillier generator of the project's public key.
    pub g: BigUint,
    /// The Paillier modulus of the project's public key.
    pub n: BigUint,
    pub status: ProjectStatus,
    /// The number of the round currently accepting submissions. Zero until
    /// the first round is opened.
    pub current_round: u32,
    /// The round count after which the project completes.
    pub maximum_rounds: u32,
    /// The artifact link of the model every participant starts from.
    pub initial_global_model: String,
    /// The canonical shape every submission must match.
    pub shape: ShapeDescriptor,
    /// The closed set of participants allowed to submit.
    pub participants: BTreeSet<ParticipantId>,
}

/// A single training round of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub project_id: ProjectId,
    pub round_number: u32,
    /// The artifact link of the global model participants train against in
    /// this round. For round one this is the project's initial model; for
    /// every later round it is the encrypted aggregate of the previous one.
    pub global_model_link: String,
}

/// An accepted participant submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub project_id: ProjectId,
    pub round_number: u32,
    pub participant: ParticipantId,
    /// The participant's scaled weights, encrypted under the project key.
    pub encrypted_parameters: EncryptedVector,
    /// Where the participant published its raw update.
    pub artifact_link: String,
}
