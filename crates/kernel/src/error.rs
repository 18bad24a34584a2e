use gridspace_common::ChunkId;

/// Errors from world operations. All of them indicate caller mistakes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    #[error("cell ({x}, {y}) is outside the world")]
    CellOutOfBounds { x: u32, y: u32 },
    #[error("position ({x}, {y}) is outside the world")]
    PositionOutOfBounds { x: f32, y: f32 },
    #[error("chunk ({x}, {y}) is outside the world")]
    ChunkOutOfBounds { x: u32, y: u32 },
    #[error("{0} is not available")]
    ChunkNotAvailable(ChunkId),
    #[error("edit permission belongs to another world")]
    ForeignPermission,
    #[error("edit permission is already held")]
    PermissionAlreadyGranted,
    #[error("an edit is already in progress")]
    EditInProgress,
    #[error("binder is already attached")]
    BinderAlreadyAttached,
    #[error("binder priority {0} is outside [0, 10000]")]
    BinderPriorityOutOfRange(i32),
    #[error("unknown active area {0}")]
    UnknownActiveArea(u64),
    #[error("invalid world config: {0}")]
    InvalidConfig(String),
}
