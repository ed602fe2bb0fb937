//! Gene/exon overlap lookup for variant coordinates.
//!
//! A [`GeneIntervalIndex`] is built for one gene file over one coordinate range
//! of one chromosome. Construction fans the range out over a fixed number of
//! workers, each asking the [`GeneFeatureSource`] for its sub-range and
//! inserting the GENE and EXON features it gets back into one shared map
//! guarded by a single lock. A sub-range that fails to load is logged and left
//! out; whatever the other workers loaded is kept.
//!
//! [`GeneIndexCache`] holds the built indexes for the duration of one file's
//! indexing run, keyed by gene file.

use crate::codec::{FeatureCodec, GeneCodec};
use crate::document::Document;
use crate::reference::{Chromosome, normalize_contig};
use crate::schema::FieldRegistry;
use crate::types::{FeatureKind, GeneIndexEntry, GeneOverlapInfo};
use crate::{Error, Result};
use async_trait::async_trait;
use rust_lapper::{Interval, Lapper};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use uuid::Uuid;

/// Anything that can answer "which gene model features lie in this range".
#[async_trait]
pub trait GeneFeatureSource: Send + Sync {
    /// Identity of the gene file, used as the cache key
    fn file_id(&self) -> u64;

    /// Features on `chromosome` intersecting the inclusive range `[start, end]`
    async fn features(
        &self,
        chromosome: &Chromosome,
        start: u64,
        end: u64,
    ) -> Result<Vec<GeneIndexEntry>>;
}

/// Gene source backed by an already built gene document index.
pub struct IndexedGeneSource {
    file_id: u64,
    by_contig: HashMap<String, Vec<GeneIndexEntry>>,
}

impl IndexedGeneSource {
    /// Decode gene documents; undecodable documents are skipped.
    pub fn from_documents(
        file_id: u64,
        registry: &FieldRegistry,
        documents: impl IntoIterator<Item = Document>,
    ) -> Result<Self> {
        let codec = GeneCodec::new(registry);
        let mut features = Vec::new();

        for doc in documents {
            match codec.decode(&doc) {
                Ok(feature) => features.push(feature),
                Err(e) if !e.is_fatal() => tracing::warn!("skipping gene document: {}", e),
                Err(e) => return Err(e),
            }
        }

        Ok(Self::from_features(file_id, features))
    }

    pub fn from_features(file_id: u64, features: impl IntoIterator<Item = GeneIndexEntry>) -> Self {
        let mut by_contig: HashMap<String, Vec<GeneIndexEntry>> = HashMap::new();
        for feature in features {
            let Some(chromosome) = &feature.base.chromosome else {
                continue;
            };
            by_contig
                .entry(normalize_contig(&chromosome.name))
                .or_default()
                .push(feature);
        }
        for features in by_contig.values_mut() {
            features.sort_by_key(|f| (f.base.start, f.base.end));
        }

        Self { file_id, by_contig }
    }

    /// Load the committed gene documents of `file_id` from a JSON-lines index.
    pub async fn load(dir: &Path, file_id: u64, registry: &FieldRegistry) -> Result<Self> {
        let documents = crate::sink::read_documents(dir, file_id).await?;
        tracing::info!(
            "loaded {} gene documents for file {}",
            documents.len(),
            file_id
        );
        Self::from_documents(file_id, registry, documents)
    }

    pub fn len(&self) -> usize {
        self.by_contig.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_contig.is_empty()
    }
}

#[async_trait]
impl GeneFeatureSource for IndexedGeneSource {
    fn file_id(&self) -> u64 {
        self.file_id
    }

    async fn features(
        &self,
        chromosome: &Chromosome,
        start: u64,
        end: u64,
    ) -> Result<Vec<GeneIndexEntry>> {
        let Some(features) = self.by_contig.get(&normalize_contig(&chromosome.name)) else {
            return Ok(Vec::new());
        };

        Ok(features
            .iter()
            .take_while(|f| f.base.start <= end)
            .filter(|f| f.base.end >= start)
            .cloned()
            .collect())
    }
}

type FeatureKey = (u64, u64, Uuid, String);

/// Gene and exon spans of one gene file over one chromosome range.
#[derive(Debug)]
pub struct GeneIntervalIndex {
    gene_file_id: u64,
    chromosome: Chromosome,
    start: u64,
    end: u64,
    features: Vec<GeneIndexEntry>,
    // half-open spans pointing into `features`
    intervals: Lapper<u64, usize>,
}

impl GeneIntervalIndex {
    /// Load the features of `[start, end]` on `chromosome` with `workers`
    /// concurrent sub-range queries.
    pub async fn build(
        source: Arc<dyn GeneFeatureSource>,
        chromosome: &Chromosome,
        start: u64,
        end: u64,
        workers: usize,
    ) -> Result<Self> {
        let (start, end) = chromosome.clamp(start, end)?;
        let shared: Arc<Mutex<BTreeMap<FeatureKey, GeneIndexEntry>>> =
            Arc::new(Mutex::new(BTreeMap::new()));

        let mut tasks = JoinSet::new();
        for (sub_start, sub_end) in sub_ranges(start, end, workers) {
            let source = Arc::clone(&source);
            let shared = Arc::clone(&shared);
            let chromosome = chromosome.clone();

            tasks.spawn(async move {
                let features = source.features(&chromosome, sub_start, sub_end).await?;
                let mut map = shared
                    .lock()
                    .map_err(|_| Error::Internal("gene interval lock poisoned".to_string()))?;
                for feature in features
                    .into_iter()
                    .filter(|f| matches!(f.base.kind, FeatureKind::Gene | FeatureKind::Exon))
                {
                    let key = (
                        feature.base.start,
                        feature.base.end,
                        feature.base.uuid,
                        feature.base.feature_id.clone(),
                    );
                    map.entry(key).or_insert(feature);
                }
                Ok::<_, Error>(())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(
                    "gene features of {} failed to load for part of {}-{}: {}",
                    chromosome.name,
                    start,
                    end,
                    e
                ),
                Err(e) => tracing::warn!("gene interval worker panicked: {}", e),
            }
        }

        let features = Arc::try_unwrap(shared)
            .map_err(|_| Error::Internal("gene interval map still shared".to_string()))?
            .into_inner()
            .map_err(|_| Error::Internal("gene interval lock poisoned".to_string()))?;

        let features: Vec<GeneIndexEntry> = features.into_values().collect();
        let intervals = Lapper::new(
            features
                .iter()
                .enumerate()
                .map(|(i, f)| Interval {
                    start: f.base.start,
                    stop: f.base.end + 1,
                    val: i,
                })
                .collect(),
        );
        tracing::debug!(
            "gene interval index for {}:{}-{} holds {} features",
            chromosome.name,
            start,
            end,
            features.len()
        );

        Ok(Self {
            gene_file_id: source.file_id(),
            chromosome: chromosome.clone(),
            start,
            end,
            features,
            intervals,
        })
    }

    pub fn gene_file_id(&self) -> u64 {
        self.gene_file_id
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Whether this index was built over a range containing `[start, end]` on `chromosome`.
    pub fn covers(&self, chromosome: &Chromosome, start: u64, end: u64) -> bool {
        self.chromosome.id == chromosome.id
            && self.chromosome.name == chromosome.name
            && self.start <= start
            && end <= self.end
    }

    /// Features whose inclusive span contains `pos`, in start order.
    pub fn overlapping(&self, pos: u64) -> Vec<&GeneIndexEntry> {
        self.intervals
            .find(pos, pos + 1)
            .map(|iv| &self.features[iv.val])
            .collect()
    }

    /// Genes overlapping either endpoint of `[start, end]`.
    ///
    /// Only the two endpoints are looked up, not the span between them. The
    /// exon flag is set on every returned gene when any feature at either
    /// endpoint is an exon.
    pub fn overlapping_endpoints(&self, start: u64, end: u64) -> BTreeSet<GeneOverlapInfo> {
        let mut hits = self.overlapping(start);
        if end != start {
            hits.extend(self.overlapping(end));
        }

        let is_exon = hits.iter().any(|f| f.base.kind == FeatureKind::Exon);

        hits.iter()
            .filter(|f| f.base.kind == FeatureKind::Gene)
            .map(|f| GeneOverlapInfo::new(f.gene_id(), f.gene_name(), is_exon))
            .collect()
    }
}

/// Split `[start, end]` into at most `parts` contiguous, non-overlapping ranges.
fn sub_ranges(start: u64, end: u64, parts: usize) -> Vec<(u64, u64)> {
    let length = end - start + 1;
    let parts = (parts.max(1) as u64).min(length);
    let step = length.div_ceil(parts);

    let mut ranges = Vec::with_capacity(parts as usize);
    let mut from = start;
    while from <= end {
        let to = from.saturating_add(step - 1).min(end);
        ranges.push((from, to));
        if to == end {
            break;
        }
        from = to + 1;
    }
    ranges
}

/// Built gene interval indexes, one per gene file, for one indexing run.
pub struct GeneIndexCache {
    workers: usize,
    indexes: HashMap<u64, Arc<GeneIntervalIndex>>,
}

impl GeneIndexCache {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            indexes: HashMap::new(),
        }
    }

    /// Index of `source` covering `[start, end]`, building it if the cached
    /// one does not.
    pub async fn get_or_build(
        &mut self,
        source: &Arc<dyn GeneFeatureSource>,
        chromosome: &Chromosome,
        start: u64,
        end: u64,
    ) -> Result<Arc<GeneIntervalIndex>> {
        let file_id = source.file_id();
        if let Some(index) = self.indexes.get(&file_id) {
            if index.covers(chromosome, start, end) {
                return Ok(Arc::clone(index));
            }
        }

        let index = Arc::new(
            GeneIntervalIndex::build(Arc::clone(source), chromosome, start, end, self.workers)
                .await?,
        );
        self.indexes.insert(file_id, Arc::clone(&index));
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    pub fn clear(&mut self) {
        self.indexes.clear();
    }
}
