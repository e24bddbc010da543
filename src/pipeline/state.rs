use sceneloom_common::SceneId;
use std::fmt;

/// Where a scene is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    Created,
    Submitting { stage: usize },
    Polling { stage: usize },
    StageComplete { stage: usize },
    Done,
    Failed,
}

impl SceneState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether `next` may follow this state.
    pub fn can_advance_to(&self, next: SceneState) -> bool {
        use SceneState::*;

        match (*self, next) {
            (Created, Submitting { stage: 0 }) => true,
            (StageComplete { stage }, Submitting { stage: to }) => to == stage + 1,
            (Submitting { stage }, Polling { stage: to }) => to == stage,
            (Polling { stage }, StageComplete { stage: to }) => to == stage,
            (StageComplete { .. }, Done) => true,
            (Submitting { .. } | Polling { .. }, Failed) => true,
            // a stage's payload can fail to build before it is submitted
            (Created | StageComplete { .. }, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SceneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Submitting { stage } => write!(f, "submitting[{stage}]"),
            Self::Polling { stage } => write!(f, "polling[{stage}]"),
            Self::StageComplete { stage } => write!(f, "stage-complete[{stage}]"),
            Self::Done => f.write_str("done"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Logs every transition of one scene's state.
#[derive(Debug)]
pub(crate) struct StateTracker {
    scene: SceneId,
    state: SceneState,
}

impl StateTracker {
    pub(crate) fn new(scene: SceneId) -> Self {
        Self {
            scene,
            state: SceneState::Created,
        }
    }

    pub(crate) fn state(&self) -> SceneState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: SceneState) {
        if !self.state.can_advance_to(next) {
            tracing::warn!(
                scene = %self.scene,
                from = %self.state,
                to = %next,
                "Unexpected scene state transition"
            );
        }
        tracing::debug!(scene = %self.scene, from = %self.state, to = %next, "Scene state changed");
        self.state = next;
    }
}
