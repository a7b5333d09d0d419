//! Small shared helpers.

pub mod varint;
