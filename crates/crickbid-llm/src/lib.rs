pub mod client;
pub mod grader;
pub mod prompt;

pub use grader::{ClaudeGrader, LlmGrader};
