pub mod connectivity;
pub mod notices;
pub mod quiz_session;
pub mod quiz_timing;
pub mod randomizer;
pub mod reconciliation;
