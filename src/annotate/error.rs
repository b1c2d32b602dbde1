use crate::annotate::model::AnnotationId;

/// Failures raised while authoring annotations.
///
/// None of these are fatal: resolution and construction failures are absorbed
/// by the controller, command failures are reported back to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotateError {
    /// Nothing usable under the pointer (no vertex, no slice plane, outside viewport).
    Resolution { reason: String },
    /// The requested edit is not available in the current state.
    IllegalOperation { operation: String, reason: String },
    /// A command targets an annotation that no longer exists.
    StaleReference { annotation: AnnotationId },
    /// A construction session could not be set up or produced an invalid shape.
    InvalidConstruction { reason: String },
}

impl AnnotateError {
    pub fn resolution(reason: impl Into<String>) -> Self {
        Self::Resolution {
            reason: reason.into(),
        }
    }

    pub fn illegal(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IllegalOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn stale(annotation: AnnotationId) -> Self {
        Self::StaleReference { annotation }
    }

    pub fn invalid_construction(reason: impl Into<String>) -> Self {
        Self::InvalidConstruction {
            reason: reason.into(),
        }
    }

    /// Errors the user should see; the rest are silently absorbed.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, Self::StaleReference { .. })
    }
}

impl std::fmt::Display for AnnotateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolution { reason } => write!(f, "no coordinate under pointer: {reason}"),
            Self::IllegalOperation { operation, reason } => {
                write!(f, "{operation} is not available: {reason}")
            }
            Self::StaleReference { annotation } => {
                write!(f, "annotation {annotation} no longer exists")
            }
            Self::InvalidConstruction { reason } => {
                write!(f, "annotation cannot be constructed: {reason}")
            }
        }
    }
}

impl std::error::Error for AnnotateError {}
