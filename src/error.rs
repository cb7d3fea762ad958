//! DistArrayError: unified error type for dist-array public APIs.
//!
//! Most container operations are collective: a failure discovered on one rank
//! mid-collective cannot be recovered without leaving ranks in divergent
//! state, so active-message delivery paths treat these errors as fatal.
//! The fallible surface (registry resolution, shuffle accounting) still
//! reports through this enum so callers and tests can inspect causes.

use crate::comm::ContainerId;
use thiserror::Error;

/// Unified error type for dist-array operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DistArrayError {
    /// An active message named a container id that was never registered on
    /// the destination rank. Indicates out-of-order collective construction.
    #[error("no container registered under id {id}")]
    UnknownContainer { id: ContainerId },
    /// The registry slot exists but holds a container of a different type.
    #[error("container {id} is registered with a different element type")]
    ContainerTypeMismatch { id: ContainerId },
    /// The scatter phase of a global shuffle staged a different number of
    /// values than the container holds; some rank called the collective with
    /// mismatched state.
    #[error("global shuffle staged {staged} values but the container holds {expected}")]
    StagedCountMismatch { staged: usize, expected: usize },
}
