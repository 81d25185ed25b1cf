use base64::{engine::general_purpose, Engine};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Failed to read '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{0}' contains no data")]
    Empty(String),
}

#[derive(Debug, Clone)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// One submitted image: where its bytes live plus how to call it.
#[derive(Debug, Clone)]
pub struct InputItem {
    pub name: String,
    pub mime_type: Option<String>,
    pub source: ImageSource,
}

impl InputItem {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            source: ImageSource::Bytes(bytes),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            mime_type: None,
            source: ImageSource::File(path.to_path_buf()),
        }
    }

    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type;
        self
    }
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub file_name: String,
    pub mime_type: String,
    pub data_uri: String,
    pub byte_len: usize,
    /// Hex SHA-256 of the raw bytes.
    pub digest: String,
}

pub async fn encode(item: InputItem) -> Result<EncodedImage, EncodeError> {
    let InputItem {
        name,
        mime_type,
        source,
    } = item;

    let bytes = match source {
        ImageSource::Bytes(bytes) => bytes,
        ImageSource::File(path) => tokio::fs::read(&path)
            .await
            .map_err(|source| EncodeError::Io {
                name: name.clone(),
                source,
            })?,
    };

    if bytes.is_empty() {
        return Err(EncodeError::Empty(name));
    }

    let mime_type = resolve_mime_type(mime_type.as_deref(), &bytes);
    let data_uri = format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(&bytes)
    );

    log::debug!("Encoded '{}' ({} bytes, {})", name, bytes.len(), mime_type);

    Ok(EncodedImage {
        file_name: name,
        mime_type,
        data_uri,
        byte_len: bytes.len(),
        digest: calculate_image_hash(&bytes),
    })
}

pub fn calculate_image_hash(image_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_data);
    hex::encode(hasher.finalize())
}

/// Trusts a declared `image/*` type, otherwise sniffs the magic bytes.
fn resolve_mime_type(declared: Option<&str>, bytes: &[u8]) -> String {
    if let Some(declared) = declared.filter(|m| m.starts_with("image/")) {
        return declared.to_string();
    }
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| FALLBACK_MIME_TYPE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[tokio::test]
    async fn encodes_bytes_into_a_data_uri() {
        let encoded = encode(InputItem::from_bytes("scan.png", PNG_MAGIC.to_vec()))
            .await
            .unwrap();

        assert_eq!(encoded.file_name, "scan.png");
        assert_eq!(encoded.mime_type, "image/png");
        assert!(encoded.data_uri.starts_with("data:image/png;base64,iVBORw0KGgo"));
        assert_eq!(encoded.byte_len, PNG_MAGIC.len());
        assert_eq!(encoded.digest.len(), 64);
    }

    #[tokio::test]
    async fn declared_image_type_wins_over_sniffing() {
        let item = InputItem::from_bytes("scan", PNG_MAGIC.to_vec())
            .with_mime_type(Some("image/webp".into()));
        assert_eq!(encode(item).await.unwrap().mime_type, "image/webp");

        let item = InputItem::from_bytes("blob", b"plain words".to_vec())
            .with_mime_type(Some("text/plain".into()));
        assert_eq!(encode(item).await.unwrap().mime_type, FALLBACK_MIME_TYPE);
    }

    #[tokio::test]
    async fn reads_files_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        file.write_all(PNG_MAGIC).unwrap();

        let item = InputItem::from_path(file.path());
        assert!(item.name.ends_with(".png"));

        let encoded = encode(item).await.unwrap();
        assert_eq!(encoded.digest, calculate_image_hash(PNG_MAGIC));
    }

    #[tokio::test]
    async fn unreadable_or_empty_sources_fail() {
        let missing = InputItem::from_path("/definitely/not/here.png");
        assert!(matches!(encode(missing).await, Err(EncodeError::Io { .. })));

        let empty = InputItem::from_bytes("empty.png", Vec::new());
        assert!(matches!(encode(empty).await, Err(EncodeError::Empty(name)) if name == "empty.png"));
    }

    #[test]
    fn identical_bytes_share_a_digest() {
        assert_eq!(calculate_image_hash(b"abc"), calculate_image_hash(b"abc"));
        assert_ne!(calculate_image_hash(b"abc"), calculate_image_hash(b"abd"));
    }
}
