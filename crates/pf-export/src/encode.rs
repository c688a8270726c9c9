//! Byte and data-URL encodings of an [`Artifact`].

use crate::csv::convert_to_csv;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pf_core::artifact::Artifact;

/// CSV text for a snapshot, raw bytes for an image.
pub fn artifact_bytes(artifact: &Artifact) -> Vec<u8> {
    match artifact {
        Artifact::TabularSnapshot(rows) => convert_to_csv(rows).into_bytes(),
        Artifact::ImageBlob { bytes, .. } => bytes.clone(),
    }
}

/// Inline `data:` URL suitable for an anchor `href`.
///
/// CSV is embedded as-is after a charset marker; images are base64.
pub fn data_url(artifact: &Artifact) -> String {
    match artifact {
        Artifact::TabularSnapshot(rows) => {
            format!("data:{};charset=utf-8,{}", artifact.mime(), convert_to_csv(rows))
        }
        Artifact::ImageBlob { bytes, mime } => {
            format!("data:{mime};base64,{}", BASE64.encode(bytes))
        }
    }
}
