//! Source-file dependencies with content digests.

use sha2::{Digest, Sha256};
use tagc_codegen::Dependency;
use tagc_types::Document;

/// Lowercase hex SHA-256 of `text`.
pub fn source_digest(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// One `Path` dependency per source file of `doc`, in file order.
pub fn source_dependencies(doc: &Document) -> Vec<Dependency> {
    doc.files()
        .iter()
        .map(|file| Dependency::Path {
            path: file.name.clone(),
            digest: source_digest(&file.source),
        })
        .collect()
}
