pub mod annotation;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod indexer;
pub mod interval;
pub mod reference;
pub mod schema;
pub mod simplify;
pub mod sink;
pub mod types;
pub mod vcf;
pub mod writer;

pub use config::{Config, IndexingOptions};
pub use error::{Error, Result};
