pub mod annotate;
pub mod logging;
pub mod settings;
