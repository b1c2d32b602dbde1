pub mod builder;
pub mod command;
pub mod controller;
pub mod error;
pub mod history;
pub mod input;
pub mod messages;
pub mod model;
pub mod modify;
pub mod replay;
pub mod settings;
pub mod settings_store;
pub mod space;
pub mod state;
pub mod store;

pub use controller::{AnnotationInputModeController, ModeRequest};
pub use error::AnnotateError;
pub use replay::{run_script, ReplayOutcome, ReplayScript};
pub use store::{AnnotationStore, MemoryAnnotationStore};
