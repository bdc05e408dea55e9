//! Crossing identity and stage tracking shared by both sides.

use std::fmt;

use cbactions_core::observability;
use cbactions_core::BridgeError;

/// Which side of the bridge a crossing is being driven from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Inside,
    Outside,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inside => "inside",
            Self::Outside => "outside",
        }
    }
}

/// Inside: Idle → SecretsUnwrapped → FilesWritten → PayloadForwarded →
/// AgentExited → ExitCodeRelayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InsideStage {
    Idle,
    SecretsUnwrapped,
    FilesWritten,
    PayloadForwarded,
    AgentExited,
    ExitCodeRelayed,
}

/// Outside: Idle → EnvelopesPrepared → JobSubmitted → Polling → JobCompleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OutsideStage {
    Idle,
    EnvelopesPrepared,
    JobSubmitted,
    Polling,
    JobCompleted,
}

impl fmt::Display for InsideStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for OutsideStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One bridge crossing: a uuid plus the current stage.
#[derive(Debug)]
pub struct Crossing<S> {
    id: String,
    side: Side,
    stage: S,
}

impl<S: Copy + Ord + fmt::Display> Crossing<S> {
    pub fn new(side: Side, initial: S) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            side,
            stage: initial,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stage(&self) -> S {
        self.stage
    }

    /// Move forward to `next`. Stages only advance.
    pub(crate) fn advance(&mut self, next: S) {
        debug_assert!(next > self.stage, "stage {} after {}", next, self.stage);
        self.stage = next;
        tracing::info!(crossing_id = %self.id, side = self.side.as_str(), stage = %next, "crossing stage");
        observability::audit_crossing_stage(&self.id, self.side.as_str(), &next.to_string());
    }

    /// Record a fatal error at the current stage and hand it back.
    pub(crate) fn fail(&self, err: BridgeError) -> BridgeError {
        tracing::error!(
            crossing_id = %self.id,
            side = self.side.as_str(),
            stage = %self.stage,
            error = %err,
            "crossing aborted"
        );
        observability::audit_crossing_failed(&self.id, self.side.as_str(), err.kind());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crossing_ids_are_unique() {
        let a = Crossing::new(Side::Inside, InsideStage::Idle);
        let b = Crossing::new(Side::Inside, InsideStage::Idle);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().len(), 36);
    }

    #[test]
    fn test_advance_moves_forward() {
        let mut c = Crossing::new(Side::Outside, OutsideStage::Idle);
        c.advance(OutsideStage::EnvelopesPrepared);
        c.advance(OutsideStage::JobSubmitted);
        assert_eq!(c.stage(), OutsideStage::JobSubmitted);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(InsideStage::ExitCodeRelayed.to_string(), "ExitCodeRelayed");
        assert_eq!(OutsideStage::Polling.to_string(), "Polling");
    }
}
