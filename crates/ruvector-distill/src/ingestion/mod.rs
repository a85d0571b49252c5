//! Document ingestion: chunking raw text into analysis windows

pub mod chunker;

pub use chunker::DocumentChunker;
