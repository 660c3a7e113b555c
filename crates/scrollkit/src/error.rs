#![forbid(unsafe_code)]

//! Error type shared by every [`Dom`](crate::dom::Dom) implementation.

/// Failure reported by a DOM operation.
///
/// Attach paths propagate these with `?`. Teardown paths never do: they log
/// and keep going (see [`RestoreStack::unwind`](crate::restore::RestoreStack::unwind)).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    /// The node is no longer part of the document.
    #[error("node is detached from the document")]
    Detached,
    /// A global the behavior depends on (window, document, visual viewport) is missing.
    #[error("missing global: {0}")]
    MissingGlobal(&'static str),
    /// Writing an inline style property failed.
    #[error("failed to set style `{property}`: {reason}")]
    Style { property: String, reason: String },
    /// Adding or removing an event listener failed.
    #[error("listener for `{event}` failed: {reason}")]
    Listener { event: &'static str, reason: String },
    /// Creating or disconnecting a mutation observer failed.
    #[error("mutation observer failed: {0}")]
    Observer(String),
    /// Moving focus failed.
    #[error("focus failed: {0}")]
    Focus(String),
}
