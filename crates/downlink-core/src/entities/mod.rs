//! Runtime carriers for the five message families.
//!
//! Entities validate names against the definition tables on construction
//! and store values positionally; the name→slot mapping lives in the
//! derived maps, so the hot path never hashes strings.

mod ack;
mod command;
mod fragment;
mod report;
mod response;
mod variable;

pub use ack::Ack;
pub use command::Command;
pub use fragment::Fragment;
pub use report::Report;
pub use response::Response;
pub use variable::Variable;
