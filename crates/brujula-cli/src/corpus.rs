use std::path::Path;

use anyhow::Context;
use brujula_ai::IndexDocument;

/// Load the policy corpus: a JSON array of chunks, each carrying the
/// document name, source path, and content excerpt.
pub fn load(path: &Path) -> anyhow::Result<Vec<IndexDocument>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read corpus file {}", path.display()))?;
    let documents: Vec<IndexDocument> = serde_json::from_str(&content)
        .with_context(|| format!("corpus file {} is not valid JSON", path.display()))?;
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn loads_chunks_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"document_name": "Política de Regalos.pdf", "source": "docs/regalos.pdf", "content": "Todo regalo debe declararse."}}]"#
        )
        .unwrap();

        let documents = load(file.path()).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].document_name, "Política de Regalos.pdf");
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load(Path::new("no/such/corpus.json")).is_err());
    }
}
