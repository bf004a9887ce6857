//! Collaborator codecs: formats for getting a tree in and out of process.
//! Neither module touches the core crate's invariants directly — both
//! build trees through the same public container/view API any other
//! caller would use.

pub mod binary;
pub mod json;
