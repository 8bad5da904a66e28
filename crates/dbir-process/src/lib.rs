pub mod config;
pub mod eval_stream;
pub mod export;
pub mod message;

mod emit_warnings;
