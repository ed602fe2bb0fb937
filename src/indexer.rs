//! Per-file indexing run.
//!
//! Records arrive as a stream and are processed chromosome by chromosome: a
//! batch is flushed as soon as the contig changes, so only one chromosome's
//! records are held at a time. For each batch the gene interval index covering
//! the records' span is fetched from the cache (or built), every record is
//! looked up at its endpoints, exploded by the simplifier and queued to the
//! single index writer. The run commits only when every record was written;
//! any fatal error rolls the sink back.

use crate::config::IndexingOptions;
use crate::interval::{GeneFeatureSource, GeneIndexCache, GeneIntervalIndex};
use crate::reference::Chromosome;
use crate::schema::FieldRegistry;
use crate::simplify::simplify;
use crate::sink::IndexSink;
use crate::types::{GeneOverlapInfo, IndexEntry};
use crate::vcf::VariantRecord;
use crate::writer::{IndexWriterAdapter, spawn_writer};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outcome of one indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    pub file_id: u64,
    pub records: u64,
    pub documents: u64,
    pub chromosomes: usize,
    pub records_in_genes: u64,
}

pub struct VariantIndexer {
    registry: Arc<FieldRegistry>,
    ambiguous: Vec<String>,
    options: IndexingOptions,
    genes: Option<Arc<dyn GeneFeatureSource>>,
    cache: GeneIndexCache,
}

impl VariantIndexer {
    pub fn new(registry: Arc<FieldRegistry>, ambiguous: Vec<String>, options: IndexingOptions) -> Self {
        let cache = GeneIndexCache::new(options.workers);
        Self {
            registry,
            ambiguous,
            options,
            genes: None,
            cache,
        }
    }

    /// Resolve gene/exon overlaps against `source`.
    pub fn with_gene_source(mut self, source: Arc<dyn GeneFeatureSource>) -> Self {
        self.genes = Some(source);
        self
    }

    pub fn registry(&self) -> &Arc<FieldRegistry> {
        &self.registry
    }

    /// Index the records of file `file_id` received on `records` into `sink`
    /// and commit.
    ///
    /// An error item on the stream fails the run. On failure the sink is
    /// rolled back and nothing from this run is visible.
    pub async fn index<S>(
        &mut self,
        file_id: u64,
        mut records: mpsc::Receiver<Result<VariantRecord>>,
        sink: S,
    ) -> Result<(IndexSummary, S)>
    where
        S: IndexSink + 'static,
    {
        self.cache.clear();

        let adapter = IndexWriterAdapter::open(sink, Arc::clone(&self.registry), file_id).await?;
        let (tx, handle) = spawn_writer(adapter, self.options.queue_capacity);

        let produced = self.produce(file_id, &mut records, &tx).await;
        drop(tx);
        drop(records);

        let (adapter, written) = handle.finish().await;
        let Some(adapter) = adapter else {
            return Err(Error::Internal("index writer lost its sink".to_string()));
        };

        let failure = match (written, produced) {
            (Ok(()), Ok(mut summary)) => {
                let (sink, committed) = adapter.commit().await?;
                summary.documents = committed;
                tracing::info!(
                    "file {}: committed {} documents from {} records",
                    file_id,
                    summary.documents,
                    summary.records
                );
                return Ok((summary, sink));
            }
            (Err(e), _) | (Ok(()), Err(e)) => e,
        };

        tracing::warn!("file {}: indexing failed, rolling back: {}", file_id, failure);
        if let Err(e) = adapter.rollback().await {
            tracing::warn!("file {}: rollback failed: {}", file_id, e);
        }
        Err(failure)
    }

    async fn produce(
        &mut self,
        file_id: u64,
        records: &mut mpsc::Receiver<Result<VariantRecord>>,
        tx: &mpsc::Sender<IndexEntry>,
    ) -> Result<IndexSummary> {
        let mut summary = IndexSummary {
            file_id,
            ..Default::default()
        };
        let mut seen = BTreeSet::new();
        let mut batch: Option<(Chromosome, Vec<VariantRecord>)> = None;

        while let Some(record) = records.recv().await {
            let record = record?;
            let Some(chromosome) = record.chromosome().cloned() else {
                tracing::debug!("skipping {} without chromosome", record.entry.base.feature_id);
                continue;
            };

            let same = matches!(&batch, Some((current, _)) if current.id == chromosome.id);
            if !same {
                if let Some((current, pending)) = batch.take() {
                    self.flush(&current, pending, tx, &mut summary).await?;
                }
                seen.insert(chromosome.id);
                batch = Some((chromosome, Vec::new()));
            }
            if let Some((_, pending)) = &mut batch {
                pending.push(record);
            }
        }

        if let Some((current, pending)) = batch.take() {
            self.flush(&current, pending, tx, &mut summary).await?;
        }
        summary.chromosomes = seen.len();
        Ok(summary)
    }

    /// Look up, explode and queue one chromosome batch.
    async fn flush(
        &mut self,
        chromosome: &Chromosome,
        records: Vec<VariantRecord>,
        tx: &mpsc::Sender<IndexEntry>,
        summary: &mut IndexSummary,
    ) -> Result<()> {
        tracing::debug!(
            "file {}: {} records on {}",
            summary.file_id,
            records.len(),
            chromosome.name
        );
        let genes = self.gene_index(chromosome, &records).await?;

        for record in records {
            let overlaps = match &genes {
                Some(index) => {
                    index.overlapping_endpoints(record.entry.base.start, record.entry.base.end)
                }
                None => BTreeSet::<GeneOverlapInfo>::new(),
            };
            if !overlaps.is_empty() {
                summary.records_in_genes += 1;
            }

            for entry in simplify(&record.entry, &overlaps, &record.filters, &self.ambiguous)? {
                tx.send(IndexEntry::Variant(entry))
                    .await
                    .map_err(|_| Error::IndexWrite("index writer stopped".to_string()))?;
            }
            summary.records += 1;
        }

        Ok(())
    }

    /// Gene interval index covering every record of one chromosome batch.
    async fn gene_index(
        &mut self,
        chromosome: &Chromosome,
        records: &[VariantRecord],
    ) -> Result<Option<Arc<GeneIntervalIndex>>> {
        let Some(source) = &self.genes else {
            return Ok(None);
        };
        let Some(start) = records.iter().map(|r| r.entry.base.start).min() else {
            return Ok(None);
        };
        let end = records
            .iter()
            .map(|r| r.entry.base.end)
            .max()
            .unwrap_or(start);

        match self.cache.get_or_build(source, chromosome, start, end).await {
            Ok(index) => Ok(Some(index)),
            Err(e) if !e.is_fatal() || matches!(e, Error::InvalidRange(_)) => {
                tracing::warn!("no gene overlap for {}: {}", chromosome.name, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::document::Document;
    use crate::interval::IndexedGeneSource;
    use crate::schema::{FacetDimension, fields};
    use crate::sink::MemoryIndex;
    use crate::types::{
        FeatureIndexEntry, FeatureKind, GeneIndexEntry, VariantIndexEntry, VariationType,
    };
    use async_trait::async_trait;

    fn chr(id: u64, name: &str) -> Chromosome {
        Chromosome::new(id, name, 1_000_000)
    }

    fn record(chromosome: Chromosome, id: &str, start: u64, end: u64) -> VariantRecord {
        let mut base = FeatureIndexEntry::new(FeatureKind::Variation, chromosome, start, end);
        base.feature_id = id.to_string();
        let mut entry = VariantIndexEntry::new(base);
        entry.variation_types.insert(VariationType::Snv);
        entry.variation_type = Some(VariationType::Snv);
        VariantRecord {
            entry,
            filters: Vec::new(),
        }
    }

    fn gene(chromosome: Chromosome, kind: FeatureKind, id: &str, start: u64, end: u64) -> GeneIndexEntry {
        let mut base = FeatureIndexEntry::new(kind, chromosome, start, end);
        base.feature_id = id.to_string();
        base.feature_name = id.to_lowercase();
        GeneIndexEntry::new(base)
    }

    fn feed(records: Vec<VariantRecord>) -> mpsc::Receiver<Result<VariantRecord>> {
        let (tx, rx) = mpsc::channel(records.len().max(1));
        for record in records {
            tx.try_send(Ok(record)).unwrap();
        }
        rx
    }

    fn indexer() -> VariantIndexer {
        VariantIndexer::new(
            Arc::new(FieldRegistry::standard().unwrap()),
            Vec::new(),
            IndexingOptions {
                workers: 2,
                queue_capacity: 4,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_index_commits_all_documents() {
        let mut indexer = indexer();
        let index = MemoryIndex::new();
        let mut multi = record(chr(2, "chr2"), "rs3", 50, 50);
        multi.filters = vec!["q10".to_string(), "s50".to_string()];

        let records = vec![
            record(chr(1, "chr1"), "rs1", 100, 100),
            record(chr(1, "chr1"), "rs2", 200, 201),
            multi,
        ];
        let (summary, _) = indexer.index(3, feed(records), index.clone()).await.unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(summary.documents, 4);
        assert_eq!(summary.chromosomes, 2);

        let docs = index.documents().unwrap();
        let ids: Vec<_> = docs
            .iter()
            .filter_map(|d| d.stored_str(fields::FEATURE_ID))
            .collect();
        assert_eq!(ids, vec!["rs1", "rs2", "rs3", "rs3"]);
        assert!(docs.iter().all(|d| d.stored_str(fields::FILE_ID) == Some("3")));
    }

    #[tokio::test]
    async fn test_gene_overlap_flows_into_documents() {
        let chr1 = chr(1, "chr1");
        let source = IndexedGeneSource::from_features(
            9,
            vec![
                gene(chr1.clone(), FeatureKind::Gene, "A", 50, 150),
                gene(chr1.clone(), FeatureKind::Gene, "B", 450, 600),
                gene(chr1.clone(), FeatureKind::Exon, "B-E1", 490, 510),
            ],
        );
        let mut indexer = indexer().with_gene_source(Arc::new(source));
        let index = MemoryIndex::new();

        let (summary, _) = indexer
            .index(1, feed(vec![record(chr1, "sv", 100, 500)]), index.clone())
            .await
            .unwrap();
        assert_eq!(summary.records_in_genes, 1);
        assert_eq!(summary.documents, 2);

        let registry = FieldRegistry::standard().unwrap();
        let genes: Vec<(String, String, bool)> = index
            .documents()
            .unwrap()
            .iter()
            .map(|d| match codec::decode(&registry, d).unwrap() {
                IndexEntry::Variant(v) => (v.gene_id, v.gene_ids, v.is_exon),
                other => panic!("unexpected entry {:?}", other),
            })
            .collect();
        assert_eq!(
            genes,
            vec![
                ("A".to_string(), "A,B".to_string(), true),
                ("B".to_string(), "A,B".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_records_outside_gene_range_index_without_genes() {
        let chr1 = chr(1, "chr1");
        let source = IndexedGeneSource::from_features(9, vec![]);
        let mut indexer = indexer().with_gene_source(Arc::new(source));
        let index = MemoryIndex::new();

        let (summary, _) = indexer
            .index(
                1,
                feed(vec![record(chr1, "far", 2_000_000, 2_000_000)]),
                index.clone(),
            )
            .await
            .unwrap();
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.records_in_genes, 0);
    }

    /// Rejects every document.
    #[derive(Clone, Debug, Default)]
    struct BrokenSink {
        staged: MemoryIndex,
        rolled_back: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait]
    impl IndexSink for BrokenSink {
        async fn configure_facets(&mut self, facets: &[FacetDimension]) -> Result<()> {
            self.staged.configure_facets(facets).await
        }

        async fn add_document(&mut self, _doc: Document) -> Result<()> {
            Err(Error::Io(std::io::Error::other("read-only file system")))
        }

        async fn commit(&mut self) -> Result<u64> {
            self.staged.commit().await
        }

        async fn rollback(&mut self) -> Result<()> {
            self.rolled_back
                .store(true, std::sync::atomic::Ordering::SeqCst);
            self.staged.rollback().await
        }
    }

    #[tokio::test]
    async fn test_engine_failure_rolls_back() {
        let mut indexer = indexer();
        let sink = BrokenSink::default();
        let observed = sink.clone();

        let records = (1..=10)
            .map(|i| record(chr(1, "chr1"), &format!("rs{}", i), i * 10, i * 10))
            .collect();
        let err = indexer.index(1, feed(records), sink).await.unwrap_err();

        assert!(matches!(err, Error::IndexWrite(_)));
        assert!(observed.rolled_back.load(std::sync::atomic::Ordering::SeqCst));
        assert!(observed.staged.documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_without_type_fails_the_run() {
        let mut indexer = indexer();
        let index = MemoryIndex::new();
        let mut bad = record(chr(1, "chr1"), "rs1", 10, 10);
        bad.entry.variation_types.clear();

        let err = indexer.index(1, feed(vec![bad]), index.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(index.documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reader_error_fails_the_run() {
        let mut indexer = indexer();
        let index = MemoryIndex::new();
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(record(chr(1, "chr1"), "rs1", 10, 10))).await.unwrap();
        tx.send(Err(Error::InvalidInput("truncated record".to_string())))
            .await
            .unwrap();
        drop(tx);

        let err = indexer.index(1, rx, index.clone()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(index.documents().unwrap().is_empty());
        assert_eq!(index.staged_len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_revisited_chromosome_gets_its_own_batch() {
        let chr1 = chr(1, "chr1");
        let source = IndexedGeneSource::from_features(
            9,
            vec![
                gene(chr1.clone(), FeatureKind::Gene, "A", 50, 150),
                gene(chr1.clone(), FeatureKind::Gene, "B", 900, 1000),
            ],
        );
        let mut indexer = indexer().with_gene_source(Arc::new(source));
        let index = MemoryIndex::new();

        let records = vec![
            record(chr1.clone(), "rs1", 100, 100),
            record(chr(2, "chr2"), "rs2", 100, 100),
            record(chr1, "rs3", 950, 950),
        ];
        let (summary, _) = indexer.index(1, feed(records), index.clone()).await.unwrap();

        assert_eq!(summary.chromosomes, 2);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.records_in_genes, 2);

        let genes: Vec<_> = index
            .documents()
            .unwrap()
            .iter()
            .map(|d| d.stored_str(fields::GENE_ID).unwrap_or("").to_string())
            .collect();
        assert_eq!(genes, vec!["A", "", "B"]);
    }
}
