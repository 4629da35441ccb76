//! Error types for the render host boundary.
//!
//! Every boundary call returns a [`HostResult`]. Failures never cross the
//! boundary as panics: engine failures (including panics raised inside the
//! engine collaborator) are converted into [`HostError::Engine`].
//!
//! Callers that need the C-style contract (zero / false / null on
//! failure) can collapse a result with [`Sentinel::or_sentinel`].

use thiserror::Error;

use crate::handle::HandleKind;
use crate::session::SessionState;
use crate::shader::ShaderNodeKind;

/// Boundary error taxonomy.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    /// An unknown or already destroyed ID was referenced.
    #[error("invalid {kind} handle {id:#x}")]
    InvalidHandle { kind: HandleKind, id: u64 },

    /// The operation is not valid in the session's current state.
    #[error("{operation} is not valid in session state {state:?}")]
    StatePrecondition {
        operation: &'static str,
        state: SessionState,
    },

    /// A scene-level precondition failed (e.g. scene still in use by a run).
    #[error("{operation}: {reason}")]
    ScenePrecondition {
        operation: &'static str,
        reason: String,
    },

    /// A shader-node setter was applied to a node of a different kind.
    #[error("{setter} expects a {expected:?} node but node {node} is {actual:?}")]
    TypeMismatch {
        setter: &'static str,
        node: u32,
        expected: ShaderNodeKind,
        actual: ShaderNodeKind,
    },

    /// A name-keyed setter referenced an attribute the node does not have.
    #[error("{kind:?} node has no {value_type} attribute named '{name}'")]
    UnknownAttribute {
        kind: ShaderNodeKind,
        name: String,
        value_type: &'static str,
    },

    /// Misuse that is reported but tolerated (e.g. releasing a client with
    /// live sessions).
    #[error("usage warning: {0}")]
    UsageWarning(String),

    /// Scene contents failed validation before rendering.
    #[error("scene validation failed: {0}")]
    Validation(String),

    /// An argument had the wrong shape (array length mismatch, zero size...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The render engine collaborator failed.
    #[error("render engine failure: {0}")]
    Engine(String),
}

impl HostError {
    /// Shorthand for [`HostError::InvalidHandle`].
    pub fn invalid(kind: HandleKind, id: u64) -> Self {
        Self::InvalidHandle { kind, id }
    }

    /// Shorthand for [`HostError::InvalidArgument`].
    pub fn argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Result alias used by every boundary operation.
pub type HostResult<T> = Result<T, HostError>;

/// Errors reported by a [`RenderEngine`](crate::engine::RenderEngine).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("device {0} is not supported by this engine")]
    UnsupportedDevice(u32),
    #[error("tile render failed: {0}")]
    TileFailed(String),
    #[error("engine panicked: {0}")]
    Panicked(String),
}

impl From<EngineError> for HostError {
    fn from(err: EngineError) -> Self {
        HostError::Engine(err.to_string())
    }
}

/// Collapses a boundary result into the sentinel value of the C contract.
///
/// ```
/// use render_host::{HostError, Sentinel};
///
/// let failed: Result<u64, HostError> = Err(HostError::argument("zero width"));
/// assert_eq!(failed.or_sentinel(), 0);
/// let ok: Result<bool, HostError> = Ok(true);
/// assert!(ok.or_sentinel());
/// ```
pub trait Sentinel<T> {
    /// Returns the value on success, `T::default()` on failure.
    fn or_sentinel(self) -> T;
}

impl<T: Default> Sentinel<T> for HostResult<T> {
    fn or_sentinel(self) -> T {
        self.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HostError::invalid(HandleKind::Scene, 0x10);
        assert_eq!(err.to_string(), "invalid scene handle 0x10");

        let err = HostError::StatePrecondition {
            operation: "sample",
            state: SessionState::Created,
        };
        assert_eq!(err.to_string(), "sample is not valid in session state Created");
    }

    #[test]
    fn test_engine_error_converts() {
        let err: HostError = EngineError::UnsupportedDevice(3).into();
        assert_eq!(
            err,
            HostError::Engine("device 3 is not supported by this engine".to_string())
        );
    }

    #[test]
    fn test_sentinel_collapses_failures() {
        let failed: HostResult<Option<u32>> = Err(HostError::Validation("bad".into()));
        assert_eq!(failed.or_sentinel(), None);
        let ok: HostResult<u32> = Ok(7);
        assert_eq!(ok.or_sentinel(), 7);
    }
}
