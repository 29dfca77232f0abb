//! The HTTP API of the coordinator.

use std::{collections::BTreeSet, convert::Infallible};

use num::{bigint::BigUint, traits::Num};
use warp::{
    http::StatusCode,
    reply::{self, Json, WithStatus},
    Filter,
};

use crate::{
    aggregator::{SubmissionError, SubmissionHandler, SubmissionRequest},
    project::{ParticipantId, Project, ProjectId, ProjectStatus, Round},
    protocol::{Advance, ProjectSpec, ProtocolError, RoundProtocol},
    settings::ApiSettings,
    storage::Storage,
    trigger::TriggerHandle,
};
use fedsum_core::model::ShapeDescriptor;

/// The body of a project registration request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterProjectRequest {
    name: String,
    /// The Paillier generator, as a decimal string.
    g: String,
    /// The Paillier modulus, as a decimal string.
    n: String,
    maximum_rounds: u32,
    initial_global_model: String,
    file_structure: ShapeDescriptor,
    participants: BTreeSet<ParticipantId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    id: ProjectId,
    name: String,
    status: ProjectStatus,
    current_round: u32,
    maximum_rounds: u32,
}

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self {
            id: project.id,
            name: project.name,
            status: project.status,
            current_round: project.current_round,
            maximum_rounds: project.maximum_rounds,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
enum AdvanceResponse {
    #[serde(rename = "roundOpened")]
    RoundOpened { round: Round },
    #[serde(rename = "projectCompleted")]
    ProjectCompleted { artifact_link: String },
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

/// Starts the HTTP server at the configured address.
///
/// * `api_settings`: the address to bind to.
/// * `handler`: intake for participant submissions.
/// * `protocol`: project registration, start and advancement.
/// * `trigger`: fired whenever a submission fills up a round, so that the
///   advancement loop aggregates it.
pub async fn serve<S>(
    api_settings: ApiSettings,
    handler: SubmissionHandler<S>,
    protocol: RoundProtocol<S>,
    trigger: TriggerHandle,
) where
    S: Storage,
{
    let routes = routes(handler, protocol, trigger);
    warp::serve(routes).run(api_settings.bind_address).await
}

fn routes<S>(
    handler: SubmissionHandler<S>,
    protocol: RoundProtocol<S>,
    trigger: TriggerHandle,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone
where
    S: Storage,
{
    let register_project = warp::path!("projects")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_protocol(protocol.clone()))
        .and_then(handle_register_project);

    let start_project = warp::path!("projects" / u64 / "start")
        .and(warp::post())
        .and(with_protocol(protocol.clone()))
        .and_then(handle_start_project);

    let advance_project = warp::path!("projects" / u64 / "advance")
        .and(warp::post())
        .and(with_protocol(protocol))
        .and_then(handle_advance_project);

    let round_detail = warp::path!("projects" / u64 / "rounds" / u32)
        .and(warp::get())
        .and(with_handler(handler.clone()))
        .and_then(handle_round_detail);

    let submission = warp::path!("submissions")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_handler(handler))
        .and(with_trigger(trigger))
        .and_then(handle_submission);

    register_project
        .or(start_project)
        .or(advance_project)
        .or(round_detail)
        .or(submission)
        .with(warp::log("http"))
}

/// Handles and responds to a project registration request.
async fn handle_register_project<S: Storage>(
    request: RegisterProjectRequest,
    mut protocol: RoundProtocol<S>,
) -> Result<impl warp::Reply, Infallible> {
    let g = match BigUint::from_str_radix(&request.g, 10) {
        Ok(g) => g,
        Err(_) => {
            return Ok(json_error(
                StatusCode::BAD_REQUEST,
                "g is not a decimal integer".to_string(),
            ))
        }
    };
    let n = match BigUint::from_str_radix(&request.n, 10) {
        Ok(n) => n,
        Err(_) => {
            return Ok(json_error(
                StatusCode::BAD_REQUEST,
                "n is not a decimal integer".to_string(),
            ))
        }
    };

    let spec = ProjectSpec {
        name: request.name,
        g,
        n,
        maximum_rounds: request.maximum_rounds,
        initial_global_model: request.initial_global_model,
        shape: request.file_structure,
        participants: request.participants,
    };
    Ok(match protocol.register_project(spec).await {
        Ok(project) => reply::with_status(
            reply::json(&ProjectResponse::from(project)),
            StatusCode::CREATED,
        ),
        Err(err) => {
            warn!("failed to register project: {}", err);
            json_error(protocol_error_status(&err), err.to_string())
        }
    })
}

/// Handles and responds to a request to start a pending project.
async fn handle_start_project<S: Storage>(
    id: u64,
    mut protocol: RoundProtocol<S>,
) -> Result<impl warp::Reply, Infallible> {
    Ok(match protocol.create_first_round(ProjectId::from(id)).await {
        Ok(round) => reply::with_status(reply::json(&round), StatusCode::CREATED),
        Err(err) => {
            warn!("failed to start project {}: {}", id, err);
            json_error(protocol_error_status(&err), err.to_string())
        }
    })
}

/// Handles and responds to an explicit round advancement request.
async fn handle_advance_project<S: Storage>(
    id: u64,
    mut protocol: RoundProtocol<S>,
) -> Result<impl warp::Reply, Infallible> {
    Ok(match protocol.advance(ProjectId::from(id)).await {
        Ok(Advance::Opened(round)) => reply::with_status(
            reply::json(&AdvanceResponse::RoundOpened { round }),
            StatusCode::OK,
        ),
        Ok(Advance::Completed { artifact_link }) => reply::with_status(
            reply::json(&AdvanceResponse::ProjectCompleted { artifact_link }),
            StatusCode::OK,
        ),
        Err(err) => {
            warn!("failed to advance project {}: {}", id, err);
            json_error(protocol_error_status(&err), err.to_string())
        }
    })
}

/// Handles and responds to a request for the state of a round.
async fn handle_round_detail<S: Storage>(
    id: u64,
    round_number: u32,
    mut handler: SubmissionHandler<S>,
) -> Result<impl warp::Reply, Infallible> {
    Ok(
        match handler.round_detail(ProjectId::from(id), round_number).await {
            Ok(detail) => reply::with_status(reply::json(&detail), StatusCode::OK),
            Err(err) => json_error(submission_error_status(&err), err.to_string()),
        },
    )
}

/// Handles and responds to a participant submission.
async fn handle_submission<S: Storage>(
    request: SubmissionRequest,
    mut handler: SubmissionHandler<S>,
    trigger: TriggerHandle,
) -> Result<impl warp::Reply, Infallible> {
    let project_id = request.project_id;
    let round_number = request.round_number;
    Ok(match handler.record_submission(request).await {
        Ok(()) => {
            match handler.is_round_complete(project_id, round_number).await {
                Ok(true) => trigger.fire(project_id),
                Ok(false) => (),
                Err(err) => warn!(
                    "failed to check completion of round {} of project {}: {}",
                    round_number, project_id, err,
                ),
            }
            reply::with_status(reply::json(&serde_json::json!({})), StatusCode::OK)
        }
        Err(err) => {
            warn!("rejected submission for project {}: {}", project_id, err);
            json_error(submission_error_status(&err), err.to_string())
        }
    })
}

fn json_error(code: StatusCode, message: String) -> WithStatus<Json> {
    reply::with_status(reply::json(&ErrorResponse { message }), code)
}

fn protocol_error_status(err: &ProtocolError) -> StatusCode {
    match err {
        ProtocolError::ProjectNotFound(_) => StatusCode::NOT_FOUND,
        ProtocolError::ProjectNotRunning(_)
        | ProtocolError::ProjectAlreadyStarted(_)
        | ProtocolError::ProjectCompleted(_) => StatusCode::CONFLICT,
        ProtocolError::InvalidProject(_) => StatusCode::BAD_REQUEST,
        ProtocolError::InsufficientSubmissions { .. } => StatusCode::PRECONDITION_FAILED,
        ProtocolError::Aggregation(_)
        | ProtocolError::Packaging(_)
        | ProtocolError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn submission_error_status(err: &SubmissionError) -> StatusCode {
    match err {
        SubmissionError::ProjectNotFound(_) | SubmissionError::RoundNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        SubmissionError::NotAParticipant(_) => StatusCode::FORBIDDEN,
        SubmissionError::ProjectNotRunning(_) | SubmissionError::DuplicateSubmission => {
            StatusCode::CONFLICT
        }
        SubmissionError::ShapeMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SubmissionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Converts a submission handler into a `warp` filter.
fn with_handler<S: Storage>(
    handler: SubmissionHandler<S>,
) -> impl Filter<Extract = (SubmissionHandler<S>,), Error = Infallible> + Clone {
    warp::any().map(move || handler.clone())
}

/// Converts the round protocol into a `warp` filter.
fn with_protocol<S: Storage>(
    protocol: RoundProtocol<S>,
) -> impl Filter<Extract = (RoundProtocol<S>,), Error = Infallible> + Clone {
    warp::any().map(move || protocol.clone())
}

/// Converts a trigger handle into a `warp` filter.
fn with_trigger(
    trigger: TriggerHandle,
) -> impl Filter<Extract = (TriggerHandle,), Error = Infallible> + Clone {
    warp::any().map(move || trigger.clone())
}
