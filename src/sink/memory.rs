use super::IndexSink;
use crate::document::Document;
use crate::schema::FacetDimension;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    facets: Vec<FacetDimension>,
    staged: Vec<Document>,
    committed: Vec<Document>,
}

/// In-process index. Clones share the same underlying store.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    state: Arc<Mutex<State>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory index lock poisoned".to_string()))
    }

    /// Committed documents, in commit order.
    pub fn documents(&self) -> Result<Vec<Document>> {
        Ok(self.state()?.committed.clone())
    }

    pub fn facets(&self) -> Result<Vec<FacetDimension>> {
        Ok(self.state()?.facets.clone())
    }

    pub fn staged_len(&self) -> Result<usize> {
        Ok(self.state()?.staged.len())
    }
}

#[async_trait]
impl IndexSink for MemoryIndex {
    async fn configure_facets(&mut self, facets: &[FacetDimension]) -> Result<()> {
        self.state()?.facets = facets.to_vec();
        Ok(())
    }

    async fn add_document(&mut self, doc: Document) -> Result<()> {
        self.state()?.staged.push(doc);
        Ok(())
    }

    async fn commit(&mut self) -> Result<u64> {
        let mut state = self.state()?;
        let staged = std::mem::take(&mut state.staged);
        let count = staged.len() as u64;
        state.committed.extend(staged);
        Ok(count)
    }

    async fn rollback(&mut self) -> Result<()> {
        self.state()?.staged.clear();
        Ok(())
    }
}
