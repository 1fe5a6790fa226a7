mod fields;
pub mod remote;
pub mod student;

pub use remote::NormalizeError;
