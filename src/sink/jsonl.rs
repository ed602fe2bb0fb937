use super::IndexSink;
use crate::document::{Document, FieldValue};
use crate::schema::FacetDimension;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Document index stored as one JSON-lines file per indexed source file.
///
/// Documents are staged to `<file_id>.jsonl.tmp` and the staging file is
/// renamed over `<file_id>.jsonl` on commit, so readers see either the previous
/// commit or the new one. Facet dimensions go to `<file_id>.facets.json`.
pub struct JsonlIndex {
    dir: PathBuf,
    file_id: u64,
    facets: Vec<FacetDimension>,
    staging: Option<BufWriter<File>>,
    staged: u64,
}

impl JsonlIndex {
    pub async fn create(dir: impl Into<PathBuf>, file_id: u64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Internal(format!("failed to create {}: {}", dir.display(), e)))?;

        Ok(Self {
            dir,
            file_id,
            facets: Vec::new(),
            staging: None,
            staged: 0,
        })
    }

    pub fn documents_path(&self) -> PathBuf {
        documents_path(&self.dir, self.file_id)
    }

    fn staging_path(&self) -> PathBuf {
        self.dir.join(format!("{}.jsonl.tmp", self.file_id))
    }

    fn facets_path(&self) -> PathBuf {
        self.dir.join(format!("{}.facets.json", self.file_id))
    }

    async fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        if self.staging.is_none() {
            let file = File::create(self.staging_path()).await?;
            self.staging = Some(BufWriter::new(file));
        }
        self.staging
            .as_mut()
            .ok_or_else(|| Error::Internal("staging file not open".to_string()))
    }
}

fn documents_path(dir: &Path, file_id: u64) -> PathBuf {
    dir.join(format!("{}.jsonl", file_id))
}

#[async_trait]
impl IndexSink for JsonlIndex {
    async fn configure_facets(&mut self, facets: &[FacetDimension]) -> Result<()> {
        self.facets = facets.to_vec();
        Ok(())
    }

    async fn add_document(&mut self, doc: Document) -> Result<()> {
        // JSON has no NaN or infinity; such a line would not read back
        if let Some(field) = doc
            .fields()
            .iter()
            .find(|f| matches!(f.value, FieldValue::Double(v) if !v.is_finite()))
        {
            return Err(Error::MalformedDocument(format!(
                "non-finite value in field {}",
                field.name
            )));
        }

        let mut line = serde_json::to_vec(&doc)?;
        line.push(b'\n');
        self.writer().await?.write_all(&line).await?;
        self.staged += 1;
        Ok(())
    }

    async fn commit(&mut self) -> Result<u64> {
        let mut writer = match self.staging.take() {
            Some(writer) => writer,
            None => BufWriter::new(File::create(self.staging_path()).await?),
        };
        writer.flush().await?;
        writer.get_mut().sync_all().await?;
        drop(writer);

        fs::write(self.facets_path(), serde_json::to_vec_pretty(&self.facets)?).await?;
        fs::rename(self.staging_path(), self.documents_path()).await?;

        let committed = std::mem::take(&mut self.staged);
        tracing::debug!(
            "committed {} documents to {}",
            committed,
            self.documents_path().display()
        );
        Ok(committed)
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staging = None;
        self.staged = 0;
        match fs::remove_file(self.staging_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read the committed documents of `file_id` from `dir`.
pub async fn read_documents(dir: &Path, file_id: u64) -> Result<Vec<Document>> {
    let path = documents_path(dir, file_id);
    let content = fs::read_to_string(&path)
        .await
        .map_err(|_| Error::NotFound(path.display().to_string()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).map_err(|e| {
                Error::MalformedDocument(format!("{}:{}: {}", path.display(), n + 1, e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationDecl, AnnotationValue};
    use crate::codec::{FeatureCodec, VariantCodec};
    use crate::reference::Reference;
    use crate::schema::FieldRegistry;
    use crate::vcf::{ParsedVariant, RawVariant, build_variant};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn doc(id: &str) -> Document {
        let mut doc = Document::new();
        doc.keyword("feature_id", id.to_lowercase());
        doc.stored("feature_id", FieldValue::from(id));
        doc.stored("is_exon", FieldValue::Bytes(vec![1]));
        doc
    }

    #[tokio::test]
    async fn test_commit_and_read_back() {
        let dir = tempdir().unwrap();
        let mut index = JsonlIndex::create(dir.path(), 5).await.unwrap();
        index
            .configure_facets(&[FacetDimension {
                dimension: "facet_chr_id".to_string(),
                field: "chromosome_id".to_string(),
                multi_valued: false,
            }])
            .await
            .unwrap();

        index.add_document(doc("rs1")).await.unwrap();
        index.add_document(doc("rs2")).await.unwrap();
        assert!(read_documents(dir.path(), 5).await.is_err());

        assert_eq!(index.commit().await.unwrap(), 2);
        let docs = read_documents(dir.path(), 5).await.unwrap();
        assert_eq!(docs, vec![doc("rs1"), doc("rs2")]);
        assert!(dir.path().join("5.facets.json").exists());
        assert!(!dir.path().join("5.jsonl.tmp").exists());
    }

    #[tokio::test]
    async fn test_rollback_leaves_previous_commit() {
        let dir = tempdir().unwrap();
        let mut index = JsonlIndex::create(dir.path(), 1).await.unwrap();
        index.add_document(doc("kept")).await.unwrap();
        index.commit().await.unwrap();

        index.add_document(doc("dropped")).await.unwrap();
        index.rollback().await.unwrap();

        let docs = read_documents(dir.path(), 1).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].stored_str("feature_id"), Some("kept"));
        assert!(!dir.path().join("1.jsonl.tmp").exists());
    }

    #[tokio::test]
    async fn test_empty_commit_writes_empty_file() {
        let dir = tempdir().unwrap();
        let mut index = JsonlIndex::create(dir.path(), 2).await.unwrap();
        assert_eq!(index.commit().await.unwrap(), 0);
        assert!(read_documents(dir.path(), 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_line_is_reported() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("3.jsonl"), "{\"fields\":[]}\nnot json\n").unwrap();
        let err = read_documents(dir.path(), 3).await.unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[tokio::test]
    async fn test_non_finite_double_rejected() {
        let dir = tempdir().unwrap();
        let mut index = JsonlIndex::create(dir.path(), 4).await.unwrap();
        let mut bad = doc("rs1");
        bad.point("af", FieldValue::Double(f64::NAN));

        let err = index.add_document(bad).await.unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
        index.add_document(doc("rs2")).await.unwrap();
        assert_eq!(index.commit().await.unwrap(), 1);
        assert_eq!(read_documents(dir.path(), 4).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_nan_annotation_reads_back() {
        let decls: BTreeMap<String, AnnotationDecl> = [
            AnnotationDecl::parse("AF", "1", "Float").unwrap(),
            AnnotationDecl::parse("DP", "1", "Integer").unwrap(),
        ]
        .into_iter()
        .map(|d| (d.name.clone(), d))
        .collect();
        let registry = FieldRegistry::with_annotations(decls.values()).unwrap();
        let reference = Reference::from_lengths(1, "t", [("1".to_string(), 0)]).unwrap();
        let raw = RawVariant {
            chromosome: "1",
            position: 10,
            ids: vec!["rs9"],
            reference: "A",
            alternates: vec!["G"],
            info: "AF=nan;DP=3",
            ..Default::default()
        };
        let ParsedVariant::Record(record) = build_variant(&raw, &reference, &decls, 6).unwrap()
        else {
            panic!("expected a record");
        };

        let codec = VariantCodec::new(&registry);
        let dir = tempdir().unwrap();
        let mut index = JsonlIndex::create(dir.path(), 6).await.unwrap();
        index
            .add_document(codec.encode(&record.entry, 6).unwrap())
            .await
            .unwrap();
        index.commit().await.unwrap();

        let docs = read_documents(dir.path(), 6).await.unwrap();
        assert_eq!(docs.len(), 1);
        let entry = codec.decode(&docs[0]).unwrap();
        assert!(!entry.annotations.contains_key("af"));
        assert_eq!(entry.annotations.get("dp"), Some(&AnnotationValue::Integer(3)));
    }
}
