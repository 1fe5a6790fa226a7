mod assignment;
mod attempt;

pub use assignment::{normalize_answer, Assignment, InProgressQuestion, QuestionSpec, TestRef};
pub use attempt::{Attempt, AttemptId, ReviewOption, ReviewQuestion};
