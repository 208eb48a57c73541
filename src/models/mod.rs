//! Data models for chunked large objects.
//!
//! A parent file entity carries the transfer metadata; its payload lives in
//! chunk records owned by it and linked through `parent_id`.

pub mod chunk;
pub mod file;
