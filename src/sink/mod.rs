//! Search-index engine abstraction.
//!
//! The pipeline only needs four things from an engine: the facet dimensions
//! declared before documents arrive, document ingestion, and an all-or-nothing
//! commit or rollback. Methods take `&mut self`; one writer owns a sink.
//!
//! # Implementations
//!
//! - [`MemoryIndex`] - in-process index, used for tests and in-memory gene indexes
//! - [`JsonlIndex`] - local directory of JSON-lines document files

mod jsonl;
mod memory;

pub use jsonl::{JsonlIndex, read_documents};
pub use memory::MemoryIndex;

use crate::Result;
use crate::document::Document;
use crate::schema::FacetDimension;
use async_trait::async_trait;

#[async_trait]
pub trait IndexSink: Send {
    /// Declare the facet dimensions documents will use
    async fn configure_facets(&mut self, facets: &[FacetDimension]) -> Result<()>;

    /// Stage one document
    async fn add_document(&mut self, doc: Document) -> Result<()>;

    /// Make every staged document visible; returns how many were committed
    async fn commit(&mut self) -> Result<u64>;

    /// Discard every staged document
    async fn rollback(&mut self) -> Result<()>;
}
