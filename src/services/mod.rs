//! The chunked transfer engine.
//!
//! `ChunkStore` and `MetadataWriter` are the seams to the backing document
//! store; the upload and download pipelines only talk to those traits.

pub mod chunk_store;
pub mod document_store;
pub mod download;
pub mod errors;
pub mod metadata_writer;
pub mod transfer_service;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;
