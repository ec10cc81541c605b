use thiserror::Error;

/// Errors for pipeline contract violations.
///
/// Per-feature geometry failures are not errors: degenerate footprints,
/// failed skeletons and missing graph adjacency all degrade to `None` at the
/// call site and the feature falls back to simpler output. These variants
/// only fire when the caller breaks the assembly protocol itself.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `take_features()` was called before the batched terrain heights were
    /// delivered to this handler.
    #[error("handler queried for features while terrain heights are still pending")]
    HeightsPending,

    /// The height provider returned a result list whose length does not
    /// match the requested positions.
    #[error("height provider returned {got} heights for {expected} positions")]
    HeightCountMismatch { expected: usize, got: usize },

    /// A feature descriptor failed validation (e.g. negative building
    /// height, zero-width road).
    #[error("invalid feature descriptor: {0}")]
    InvalidDescriptor(String),
}
