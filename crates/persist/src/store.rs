//! File-backed document storage.
//!
//! Next to every saved document sits a metadata sidecar:
//! ```text
//! scene.json              - the document (JSON or TSRA binary)
//! scene.json.meta.json    - version, format and sha-256 of the file bytes
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tessera_scene::Document;

use crate::codec::{self, Format};
use crate::upgrade::{self, UpgradeReport};

/// Errors from document persistence. Only file I/O and format problems are
/// reported here; content issues are handled while instantiating.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("not a tessera document")]
    BadMagic,
    #[error("truncated document: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("document version {found} is newer than supported v{supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Contents of the `.meta.json` sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub version: u32,
    pub format: Format,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: Document,
    pub format: Format,
    pub upgrade: UpgradeReport,
    /// True when the upgraded document was written back over the source.
    pub written_back: bool,
}

/// Loads and saves documents, upgrading old versions on the way in.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    write_back: bool,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self { write_back: true }
    }
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable rewriting upgraded documents in place (read-only inspection).
    pub fn with_write_back(mut self, enabled: bool) -> Self {
        self.write_back = enabled;
        self
    }

    pub fn meta_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    /// Read the sidecar, if there is one.
    pub fn read_meta(path: &Path) -> Result<Option<DocumentMeta>, StoreError> {
        let meta_path = Self::meta_path(path);
        if !meta_path.exists() {
            return Ok(None);
        }
        let meta = serde_json::from_reader(std::fs::File::open(meta_path)?)?;
        Ok(Some(meta))
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<Document, StoreError> {
        Ok(self.open(path)?.document)
    }

    /// Load, verify, upgrade and (when enabled) write the upgrade back.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<LoadedDocument, StoreError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;

        if let Some(meta) = Self::read_meta(path)? {
            let actual = codec::sha256_hex(&bytes);
            if actual != meta.sha256 {
                return Err(StoreError::IntegrityMismatch {
                    expected: meta.sha256,
                    actual,
                });
            }
        }

        let (mut document, format) = codec::decode(&bytes)?;
        let report = upgrade::upgrade(&mut document)?;

        let mut written_back = false;
        if report.changed && self.write_back {
            self.save(path, &document, format)?;
            written_back = true;
            tracing::info!(path = %path.display(), version = document.version, "upgraded document written back");
        }

        tracing::debug!(
            path = %path.display(),
            ?format,
            objects = document.objects.len(),
            "document loaded"
        );
        Ok(LoadedDocument {
            document,
            format,
            upgrade: report,
            written_back,
        })
    }

    /// Encode and write `doc`, then refresh its sidecar.
    pub fn save(
        &self,
        path: impl AsRef<Path>,
        doc: &Document,
        format: Format,
    ) -> Result<DocumentMeta, StoreError> {
        let path = path.as_ref();
        let bytes = codec::encode(doc, format)?;
        std::fs::write(path, &bytes)?;

        let meta = DocumentMeta {
            version: doc.version,
            format,
            sha256: codec::sha256_hex(&bytes),
            bytes: bytes.len() as u64,
        };
        serde_json::to_writer_pretty(std::fs::File::create(Self::meta_path(path))?, &meta)?;
        Ok(meta)
    }
}
