//! Artifact checksums
//!
//! Computes SHA-256 digests over stored artifact bytes and manages the
//! sidecar checksum file written next to each artifact. The sidecar uses
//! the `sha256sum` line format: `<hex digest>  <filename>\n`.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{StockpileError, StockpileResult};

/// Compute the hex SHA-256 digest of a byte slice
pub fn checksum_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compute the hex SHA-256 digest of a file's contents
pub fn checksum_file(path: &Path) -> StockpileResult<String> {
    let bytes = fs::read(path).map_err(|e| {
        StockpileError::Storage(format!("Failed to read {}: {}", path.display(), e))
    })?;
    Ok(checksum_bytes(&bytes))
}

/// Path of the sidecar checksum file for an artifact
pub fn sidecar_path(artifact_path: &Path) -> PathBuf {
    let mut name = artifact_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.push_str(".sha256");
    artifact_path.with_file_name(name)
}

/// Write the sidecar checksum file next to an artifact
pub fn write_sidecar(artifact_path: &Path, digest: &str) -> StockpileResult<PathBuf> {
    let filename = artifact_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            StockpileError::Storage(format!(
                "Artifact path has no filename: {}",
                artifact_path.display()
            ))
        })?;

    let path = sidecar_path(artifact_path);
    let contents = format!("{}  {}\n", digest, filename);

    fs::write(&path, contents).map_err(|e| {
        StockpileError::Storage(format!("Failed to write sidecar {}: {}", path.display(), e))
    })?;

    Ok(path)
}

/// Read the digest recorded in an artifact's sidecar file
pub fn read_sidecar(artifact_path: &Path) -> StockpileResult<String> {
    let path = sidecar_path(artifact_path);

    let contents = fs::read_to_string(&path).map_err(|e| {
        StockpileError::Storage(format!("Failed to read sidecar {}: {}", path.display(), e))
    })?;

    parse_sidecar(&contents).ok_or_else(|| {
        StockpileError::Integrity(format!("Malformed sidecar file: {}", path.display()))
    })
}

/// Parse a `<hex64>  <filename>` sidecar line into the digest
fn parse_sidecar(contents: &str) -> Option<String> {
    let line = contents.lines().next()?;
    let digest = line.split_whitespace().next()?;

    if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    Some(digest.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_checksum_bytes_known_value() {
        // sha256 of the empty input
        assert_eq!(
            checksum_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let a = checksum_bytes(b"backup payload");
        let b = checksum_bytes(b"backup payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_single_byte_change_changes_digest() {
        let a = checksum_bytes(b"backup payload");
        let b = checksum_bytes(b"backup payloae");
        assert_ne!(a, b);
    }

    #[test]
    fn test_sidecar_path() {
        let artifact = Path::new("/backups/backup-1.csv");
        assert_eq!(
            sidecar_path(artifact),
            PathBuf::from("/backups/backup-1.csv.sha256")
        );
    }

    #[test]
    fn test_write_and_read_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("backup-1.json");
        std::fs::write(&artifact, b"payload").unwrap();

        let digest = checksum_bytes(b"payload");
        let sidecar = write_sidecar(&artifact, &digest).unwrap();

        assert!(sidecar.exists());
        let contents = std::fs::read_to_string(&sidecar).unwrap();
        assert_eq!(contents, format!("{}  backup-1.json\n", digest));

        assert_eq!(read_sidecar(&artifact).unwrap(), digest);
    }

    #[test]
    fn test_checksum_file_matches_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("backup-1.json");
        std::fs::write(&artifact, b"payload").unwrap();

        assert_eq!(
            checksum_file(&artifact).unwrap(),
            checksum_bytes(b"payload")
        );
    }

    #[test]
    fn test_malformed_sidecar_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("backup-1.json");
        std::fs::write(sidecar_path(&artifact), "not a digest\n").unwrap();

        let err = read_sidecar(&artifact).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn test_parse_sidecar() {
        let digest = "a".repeat(64);
        assert_eq!(
            parse_sidecar(&format!("{}  backup.csv\n", digest)),
            Some(digest.clone())
        );
        assert_eq!(parse_sidecar("short  backup.csv\n"), None);
        assert_eq!(parse_sidecar(""), None);
    }
}
