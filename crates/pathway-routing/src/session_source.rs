use pathway_core::{SessionConfig, Vertex};

use crate::error::RoutingError;
use crate::payment::LightningPayment;
use crate::session::{Collaborators, PathfindingSession};

/// Creates payment sessions that share one set of collaborators.
#[derive(Clone)]
pub struct SessionSource {
    self_node: Vertex,
    collaborators: Collaborators,
    config: SessionConfig,
}

impl SessionSource {
    /// Fails if `config` is invalid, so every session handed out shares a
    /// usable shard floor.
    pub fn new(
        self_node: Vertex,
        collaborators: Collaborators,
        config: SessionConfig,
    ) -> Result<Self, RoutingError> {
        config.validate()?;
        Ok(Self {
            self_node,
            collaborators,
            config,
        })
    }

    pub fn self_node(&self) -> Vertex {
        self.self_node
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A session for `payment`. Fails if the payment carries both route
    /// hints and blinded paths.
    pub fn new_payment_session(
        &self,
        payment: LightningPayment,
    ) -> Result<PathfindingSession, RoutingError> {
        tracing::debug!(target_node = %payment.target, "Creating payment session");
        PathfindingSession::new(
            payment,
            self.self_node,
            self.collaborators.clone(),
            &self.config,
        )
    }

    /// A session that fails every route request.
    pub fn new_payment_session_empty(&self, payment: LightningPayment) -> PathfindingSession {
        PathfindingSession::new_empty(
            payment,
            self.self_node,
            self.collaborators.clone(),
            &self.config,
        )
    }
}
