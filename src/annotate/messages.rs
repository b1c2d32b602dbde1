use serde::Serialize;

use crate::annotate::state::ModeKind;

/// Fire-and-forget notifications for the renderer and toolbar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum AnnotateSignal {
    Repaint,
    ToolbarRefresh,
    ModeChanged { mode: ModeKind },
    /// A command could not be applied; `message` is meant for the user.
    CommandFailed { message: String },
}
