pub(crate) mod countdown;
pub mod quiz_runner;
