pub mod attempt_cache;
