pub mod feedback;
pub mod grader;
pub mod outcome;
