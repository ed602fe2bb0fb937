use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "featidx")]
#[command(about = "Build search-index documents from annotated variant calls")]
pub struct Config {
    /// VCF file to index (plain text or bgzip-compressed)
    #[arg(long, env = "FEATIDX_VCF")]
    pub vcf: PathBuf,

    /// Identifier of the indexed file, stored on every document
    #[arg(long, env = "FEATIDX_FILE_ID", default_value = "1")]
    pub file_id: u64,

    /// FASTA index (.fai) of the reference genome; defaults to the VCF header contigs
    #[arg(long, env = "FEATIDX_REFERENCE")]
    pub reference: Option<PathBuf>,

    /// Directory holding a gene document index used for gene/exon overlap
    #[arg(long, env = "FEATIDX_GENES")]
    pub genes: Option<PathBuf>,

    /// File id of the gene documents inside the gene index directory
    #[arg(long, env = "FEATIDX_GENE_FILE_ID", default_value = "0")]
    pub gene_file_id: u64,

    /// Directory the document index is written to
    #[arg(long, env = "FEATIDX_OUTPUT_DIR", default_value = "./index")]
    pub output_dir: PathBuf,

    /// INFO fields to index (comma separated)
    #[arg(long, env = "FEATIDX_INFO_FIELDS", value_delimiter = ',')]
    pub info_field: Vec<String>,

    /// Concurrent sub-range loads when building a gene interval index
    #[arg(long, env = "FEATIDX_WORKERS", default_value = "4")]
    pub workers: usize,

    /// Capacity of the queue feeding the index writer
    #[arg(long, env = "FEATIDX_QUEUE_CAPACITY", default_value = "1024")]
    pub queue_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

/// Pipeline settings independent of where records come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingOptions {
    /// Annotation fields surfaced into documents
    pub info_fields: Vec<String>,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for IndexingOptions {
    fn default() -> Self {
        Self {
            info_fields: Vec::new(),
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

impl Config {
    pub fn indexing_options(&self) -> IndexingOptions {
        let mut info_fields: Vec<String> = Vec::with_capacity(self.info_field.len());
        for field in self.info_field.iter().map(|f| f.trim()) {
            if !field.is_empty() && !info_fields.iter().any(|f| f == field) {
                info_fields.push(field.to_string());
            }
        }

        IndexingOptions {
            info_fields,
            workers: self.workers.max(1),
            queue_capacity: self.queue_capacity.max(1),
        }
    }
}
