use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use featidx::{
    Config,
    indexer::VariantIndexer,
    interval::IndexedGeneSource,
    reference::Reference,
    schema::FieldRegistry,
    sink::JsonlIndex,
    vcf::VcfSource,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = config.indexing_options();
    tracing::info!("Indexing {:?} as file {}", config.vcf, config.file_id);

    // noodles readers are synchronous
    let (source, reference) = tokio::task::spawn_blocking({
        let vcf_path = config.vcf.clone();
        let reference_path = config.reference.clone();
        let info_fields = options.info_fields.clone();
        move || -> featidx::Result<_> {
            let source = VcfSource::open(&vcf_path, &info_fields)?;
            let reference = match &reference_path {
                Some(path) => Reference::from_fai(1, path.display().to_string(), path)?,
                None => source.header_reference(1, "vcf header")?,
            };
            Ok((source, reference))
        }
    })
    .await??;

    tracing::info!(
        "Reference {} with {} chromosomes",
        reference.name,
        reference.chromosomes().len()
    );
    let declarations: Vec<_> = source.declarations().values().cloned().collect();
    let ambiguous = source.ambiguous_fields();
    if !ambiguous.is_empty() {
        tracing::info!("Exploding ambiguous INFO fields: {}", ambiguous.join(","));
    }

    let queue_capacity = options.queue_capacity;
    let registry = Arc::new(FieldRegistry::with_annotations(&declarations)?);
    let mut indexer = VariantIndexer::new(registry, ambiguous, options);

    if let Some(dir) = &config.genes {
        let gene_registry = FieldRegistry::standard()?;
        let genes = IndexedGeneSource::load(dir, config.gene_file_id, &gene_registry).await?;
        tracing::info!("Gene overlap from {:?} ({} features)", dir, genes.len());
        indexer = indexer.with_gene_source(Arc::new(genes));
    }

    let sink = JsonlIndex::create(&config.output_dir, config.file_id).await?;
    let (records, reader) = source.spawn_reader(reference, config.file_id, queue_capacity);
    let indexed = indexer.index(config.file_id, records, sink).await;

    let stats = reader.await?;
    tracing::info!(
        "Read {} records ({} on unknown contigs, {} without variation, {} past the contig end)",
        stats.records,
        stats.unknown_chromosome,
        stats.no_variation,
        stats.out_of_bounds
    );
    let (summary, sink) = indexed?;

    tracing::info!("Wrote {:?}", sink.documents_path());
    println!("{}", serde_json::to_string(&summary)?);

    Ok(())
}
