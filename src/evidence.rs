//! Evidence file storage capability. The pipeline only needs "store these
//! bytes under a path and give me a URL back"; the shipped implementation
//! writes under a local directory, mirroring the layout the hosted bucket
//! uses: `{candidate_folder}/{perspective}/{filename}`.

use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AwardsError, Result};

#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Stores the bytes under `path` and returns a retrievable URL.
    async fn store(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String>;
}

pub struct DirEvidenceStore {
    root: PathBuf,
}

impl DirEvidenceStore {
    pub fn new(root: PathBuf) -> Self {
        DirEvidenceStore { root }
    }
}

#[async_trait]
impl EvidenceStore for DirEvidenceStore {
    async fn store(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<String> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AwardsError::Evidence(format!("create {}: {e}", parent.display())))?;
        }
        fs::write(&full, bytes)
            .map_err(|e| AwardsError::Evidence(format!("write {}: {e}", full.display())))?;
        Ok(format!("file://{}", full.display()))
    }
}

/// Folder name for one candidate's evidence, derived from the sanitized
/// name plus the submission timestamp so repeat submitters never collide.
pub fn candidate_folder(candidate_name: &str, submitted_at: DateTime<Utc>) -> String {
    format!(
        "{}-{}",
        sanitize_component(candidate_name),
        submitted_at.format("%Y%m%dT%H%M%SZ")
    )
}

/// Keeps letters and digits, maps everything else to underscores.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = file_name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase());
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("doc") | Some("docx") => "application/msword",
        Some("xls") | Some("xlsx") => "application/vnd.ms-excel",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn sanitization_strips_path_and_shell_characters() {
        assert_eq!(sanitize_component("T. Moyo / Ops"), "T._Moyo___Ops");
        assert_eq!(sanitize_component("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_component("  "), "unnamed");
    }

    #[test]
    fn candidate_folders_embed_the_timestamp() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(
            candidate_folder("Rudo Banda", ts),
            "Rudo_Banda-20260301T093000Z"
        );
    }

    #[test]
    fn content_types_cover_the_common_evidence_formats() {
        assert_eq!(content_type_for("report.PDF"), "application/pdf");
        assert_eq!(content_type_for("photo.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("no-extension"), "application/octet-stream");
    }

    #[tokio::test]
    async fn stored_files_land_under_the_requested_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirEvidenceStore::new(dir.path().to_path_buf());
        let url = store
            .store("Rudo_Banda-x/financial/receipt.pdf", b"evidence", "application/pdf")
            .await
            .unwrap();

        assert!(url.starts_with("file://"));
        let written = dir.path().join("Rudo_Banda-x/financial/receipt.pdf");
        assert_eq!(fs::read(written).unwrap(), b"evidence");
    }
}
