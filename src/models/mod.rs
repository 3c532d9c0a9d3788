pub mod document;
pub mod enums;
pub mod filters;
pub mod processing_log;
pub mod trigger;

pub use document::*;
pub use enums::*;
pub use filters::*;
pub use processing_log::*;
pub use trigger::*;
