//! Event sources that ask the protocol to advance rounds.
//!
//! The protocol itself never decides when to aggregate; something has to
//! ask it to. An [`EventSource`] is that something. The coordinator wires
//! a [`ManualTrigger`] into the REST layer, which fires it whenever a
//! submission fills up a round, but a timer or an external scheduler can
//! implement the trait just as well.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{
    project::ProjectId,
    protocol::{Advance, ProtocolError, RoundProtocol},
    storage::Storage,
};

#[async_trait]
/// A source of round advancement requests.
pub trait EventSource: Send + 'static {
    /// Waits for the next project whose round should be advanced.
    ///
    /// Returns `None` once the source is exhausted and no further requests
    /// will ever arrive.
    async fn next(&mut self) -> Option<ProjectId>;
}

/// An [`EventSource`] fed by [`TriggerHandle`]s.
pub struct ManualTrigger {
    requests: UnboundedReceiver<ProjectId>,
}

/// The sending half of a [`ManualTrigger`].
#[derive(Clone)]
pub struct TriggerHandle {
    requests: UnboundedSender<ProjectId>,
}

impl ManualTrigger {
    /// Creates a trigger together with a handle that fires it.
    pub fn new() -> (Self, TriggerHandle) {
        let (tx, rx) = unbounded_channel();
        (Self { requests: rx }, TriggerHandle { requests: tx })
    }
}

impl TriggerHandle {
    /// Requests an advancement of the project's current round.
    pub fn fire(&self, project_id: ProjectId) {
        // a dropped trigger means the loop is shutting down anyway
        let _ = self.requests.send(project_id);
    }
}

#[async_trait]
impl EventSource for ManualTrigger {
    async fn next(&mut self) -> Option<ProjectId> {
        self.requests.recv().await
    }
}

/// Drives the protocol from an event source until the source is exhausted.
///
/// Advancement failures are logged and swallowed: a round that is not
/// ready yet simply stays open until the next request arrives.
pub async fn run_advancement_loop<S, E>(mut protocol: RoundProtocol<S>, mut events: E)
where
    S: Storage,
    E: EventSource,
{
    while let Some(project_id) = events.next().await {
        match protocol.advance(project_id).await {
            Ok(Advance::Opened(round)) => {
                info!(
                    "advanced project {} to round {}",
                    project_id, round.round_number,
                );
            }
            Ok(Advance::Completed { artifact_link }) => {
                info!(
                    "project {} completed with final aggregate {}",
                    project_id, artifact_link,
                );
            }
            Err(ProtocolError::InsufficientSubmissions { submissions, required }) => {
                debug!(
                    "project {} not ready to advance: {} of {} submissions",
                    project_id, submissions, required,
                );
            }
            Err(err) => {
                warn!("failed to advance project {}: {}", project_id, err);
            }
        }
    }
    info!("advancement loop terminated");
}
