//! Challenge runs
//!
//! The retry controller and the collaborators it drives: prompt source,
//! generation backend and response-to-source extraction.

pub mod controller;
pub mod extract;
pub mod generate;
pub mod prompt;

pub use controller::{RetryController, RetryPolicy};
pub use extract::extract_code;
pub use generate::{CommandGenerator, Generator};
pub use prompt::{PromptSource, TemplatePrompt};
