use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// The container's [`ChangeToken`](crate::ChangeToken) moved after the
    /// iterator was created. The iterator stays broken; start a new one.
    #[error("container mutated during iteration")]
    MutatedDuringIteration,
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("range {start}..{end} out of bounds for length {len}")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, CollectionError>;
