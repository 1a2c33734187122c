use crate::catalog::MachineType;
use crate::registry::MachineId;
use crate::resources::ResourceBundle;

/// Recoverable failures of engine commands. None of them end the session;
/// a failed command leaves the state exactly as it was.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("not enough resources (missing {missing})")]
    InsufficientResources { missing: ResourceBundle },

    #[error("{machine} cannot be built right now")]
    BuildNotAllowed { machine: MachineType },

    #[error("machine {id} is already at max level {level}")]
    MaxLevelReached { id: MachineId, level: u32 },

    #[error("machine {0} not found")]
    NotFound(MachineId),
}
