//! Single writer between the pipeline and an [`IndexSink`].
//!
//! Producers hand simplified entries to the writer through a bounded queue;
//! the writer encodes each one with the codec of its kind and adds it to the
//! sink. Nothing is visible until the caller commits.

use crate::codec;
use crate::schema::FieldRegistry;
use crate::sink::IndexSink;
use crate::types::IndexEntry;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

pub struct IndexWriterAdapter<S> {
    sink: S,
    registry: Arc<FieldRegistry>,
    file_id: u64,
    written: u64,
}

impl<S: IndexSink> IndexWriterAdapter<S> {
    /// Wrap `sink` and register the registry's facet dimensions with it.
    pub async fn open(mut sink: S, registry: Arc<FieldRegistry>, file_id: u64) -> Result<Self> {
        sink.configure_facets(&registry.facets())
            .await
            .map_err(engine_error)?;
        Ok(Self {
            sink,
            registry,
            file_id,
            written: 0,
        })
    }

    /// Encode and stage one entry.
    pub async fn write(&mut self, entry: &IndexEntry) -> Result<()> {
        let doc = codec::encode(&self.registry, entry, self.file_id)?;
        self.sink.add_document(doc).await.map_err(engine_error)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn commit(mut self) -> Result<(S, u64)> {
        let committed = self.sink.commit().await.map_err(engine_error)?;
        Ok((self.sink, committed))
    }

    pub async fn rollback(mut self) -> Result<S> {
        self.sink.rollback().await.map_err(engine_error)?;
        Ok(self.sink)
    }
}

fn engine_error(e: Error) -> Error {
    match e {
        Error::IndexWrite(_) => e,
        other => Error::IndexWrite(other.to_string()),
    }
}

/// Join handle of a running writer task.
///
/// The adapter lives in a shared slot rather than inside the task, so it is
/// still there for rollback when the task panics or is aborted.
pub struct WriterHandle<S> {
    slot: Arc<Mutex<Option<IndexWriterAdapter<S>>>>,
    task: JoinHandle<Result<()>>,
}

impl<S> WriterHandle<S> {
    /// Wait for the writer to drain its queue and take the adapter back.
    pub async fn finish(self) -> (Option<IndexWriterAdapter<S>>, Result<()>) {
        let outcome = match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(Error::IndexWrite(format!("index writer task failed: {}", e))),
        };
        let adapter = self.slot.lock().await.take();
        (adapter, outcome)
    }
}

/// Run `adapter` as the single consumer of a bounded entry queue.
///
/// The task ends when every sender is dropped or on the first write failure.
/// The caller decides between commit and rollback after [`WriterHandle::finish`].
/// After a failure the queue is closed and further sends fail.
pub fn spawn_writer<S>(
    adapter: IndexWriterAdapter<S>,
    capacity: usize,
) -> (mpsc::Sender<IndexEntry>, WriterHandle<S>)
where
    S: IndexSink + 'static,
{
    let (tx, mut rx) = mpsc::channel::<IndexEntry>(capacity.max(1));
    let slot = Arc::new(Mutex::new(Some(adapter)));

    let task = tokio::spawn({
        let slot = Arc::clone(&slot);
        async move {
            let mut guard = slot.lock().await;
            let Some(adapter) = guard.as_mut() else {
                return Err(Error::Internal("index writer has no adapter".to_string()));
            };

            while let Some(entry) = rx.recv().await {
                if let Err(e) = adapter.write(&entry).await {
                    tracing::warn!(
                        "index writer stopped after {} documents: {}",
                        adapter.written(),
                        e
                    );
                    rx.close();
                    return Err(e);
                }
            }
            Ok(())
        }
    });

    (tx, WriterHandle { slot, task })
}
