//! Content-type detection for import sources.
//!
//! Native model containers are checked by magic number first. Only when that
//! fails does generic signature sniffing run, since a GGUF header can look
//! like arbitrary binary or even text to a generic sniffer.

use std::fmt;

use crate::ggml::source::{read_full_at, ReadAt};
use crate::ggml::{detect_container, Container};

/// Classification of a source prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    Gguf,
    Ggla,
    Zip,
    /// A specific MIME type that this importer cannot use.
    Mime(String),
    /// Generic binary data with no recognizable signature.
    Unknown,
}

impl ContentType {
    pub const ZIP_MIME: &'static str = "application/zip";
    pub const TEXT_MIME: &'static str = "text/plain; charset=utf-8";

    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Gguf => "gguf",
            ContentType::Ggla => "ggla",
            ContentType::Zip => Self::ZIP_MIME,
            ContentType::Mime(mime) => mime,
            ContentType::Unknown => "unknown",
        }
    }

    pub fn is_ggml(&self) -> bool {
        matches!(self, ContentType::Gguf | ContentType::Ggla)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify up to the first few hundred bytes of a source.
pub fn detect_content_type(prefix: &[u8]) -> ContentType {
    match detect_container(prefix) {
        Some(Container::Gguf) => return ContentType::Gguf,
        Some(Container::Ggla) => return ContentType::Ggla,
        None => {}
    }

    if let Some(kind) = infer::get(prefix) {
        return match kind.mime_type() {
            ContentType::ZIP_MIME => ContentType::Zip,
            mime => ContentType::Mime(mime.to_string()),
        };
    }

    if looks_like_text(prefix) {
        return ContentType::Mime(ContentType::TEXT_MIME.to_string());
    }

    ContentType::Unknown
}

/// Read the first `limit` bytes of `src` for sniffing.
///
/// Uses positional reads, so the source is left untouched for later stages.
pub fn sniff(src: &dyn ReadAt, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut prefix = vec![0u8; limit];
    let n = read_full_at(src, &mut prefix, 0)?;
    prefix.truncate(n);
    Ok(prefix)
}

fn looks_like_text(prefix: &[u8]) -> bool {
    if prefix.is_empty() {
        return false;
    }
    let valid = match std::str::from_utf8(prefix) {
        Ok(_) => prefix.len(),
        // A multi-byte character cut off by the sniff window is fine.
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => return false,
    };
    prefix[..valid]
        .iter()
        .all(|&b| b >= 0x20 || matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_gguf_wins_over_generic_sniffing() {
        let mut prefix = b"GGUF".to_vec();
        prefix.extend_from_slice(&3u32.to_le_bytes());
        prefix.extend_from_slice(&[0u8; 64]);
        assert_eq!(detect_content_type(&prefix), ContentType::Gguf);

        // Printable bytes after the magic still classify as gguf.
        assert_eq!(
            detect_content_type(b"GGUF this looks like text"),
            ContentType::Gguf
        );
    }

    #[test]
    fn test_ggla() {
        assert_eq!(detect_content_type(b"algg\x01\0\0\0"), ContentType::Ggla);
    }

    #[test]
    fn test_zip() {
        let prefix = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x00, 0x00, 0x08, 0x00];
        assert_eq!(detect_content_type(&prefix), ContentType::Zip);
        assert_eq!(ContentType::Zip.to_string(), "application/zip");
    }

    #[test]
    fn test_specific_mime_is_surfaced() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(
            detect_content_type(&png),
            ContentType::Mime("image/png".into())
        );
        assert_eq!(
            detect_content_type(b"FROM llama3\nPARAMETER temperature 1\n"),
            ContentType::Mime(ContentType::TEXT_MIME.into())
        );
    }

    #[test]
    fn test_unknown_binary() {
        let noise = [0x00, 0xFF, 0x13, 0x37, 0x80, 0x01, 0xFE, 0x02];
        assert_eq!(detect_content_type(&noise), ContentType::Unknown);
        assert_eq!(detect_content_type(&[]), ContentType::Unknown);
        assert_eq!(ContentType::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_legacy_ggml_is_not_native() {
        assert_eq!(
            detect_content_type(b"lmgg\x00\x01\x02\x03\xff\xfe"),
            ContentType::Unknown
        );
    }

    #[test]
    fn test_sniff_is_positional() {
        let src = Bytes::from_static(b"0123456789");
        assert_eq!(sniff(&src, 4).unwrap(), b"0123");
        assert_eq!(sniff(&src, 4).unwrap(), b"0123");
        assert_eq!(sniff(&src, 64).unwrap().len(), 10);
    }
}
