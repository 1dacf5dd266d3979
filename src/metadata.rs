//! 파일 메타데이터 (전송의 0번 청크)
//!
//! ```text
//!  u32 filename_length
//!  u32 extension_length
//!  u64 file_size
//!  bytes[filename_length]   파일 이름 (확장자 제외, UTF-8)
//!  bytes[extension_length]  확장자 (앞의 '.' 포함, UTF-8)
//! ```

use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// 고정 필드 크기
pub const METADATA_HEADER_SIZE: usize = 16;

/// 파일 이름 최대 글자 수 (미만)
pub const MAX_FILENAME_CHARS: usize = 100;

/// 확장자 최대 글자 수 (미만)
pub const MAX_EXTENSION_CHARS: usize = 10;

/// 전송 대상 파일 설명
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub filename: String,
    pub extension: String,
    pub file_size: u64,
}

impl Metadata {
    /// 새 메타데이터 (이름/확장자 길이 검증)
    pub fn new(filename: impl Into<String>, extension: impl Into<String>, file_size: u64) -> Result<Self> {
        let filename = filename.into();
        let extension = extension.into();

        let name_len = filename.chars().count();
        if name_len == 0 || name_len >= MAX_FILENAME_CHARS {
            return Err(Error::InvalidMetadata(format!(
                "파일 이름은 1~{} 글자여야 함: {:?}",
                MAX_FILENAME_CHARS - 1,
                filename
            )));
        }

        let ext_len = extension.chars().count();
        if ext_len == 0 || ext_len >= MAX_EXTENSION_CHARS {
            return Err(Error::InvalidMetadata(format!(
                "확장자는 1~{} 글자여야 함: {:?}",
                MAX_EXTENSION_CHARS - 1,
                extension
            )));
        }

        Ok(Self {
            filename,
            extension,
            file_size,
        })
    }

    /// 경로에서 이름과 확장자 추출
    pub fn from_path(path: &Path, file_size: u64) -> Result<Self> {
        let filename = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        Self::new(filename, extension, file_size)
    }

    /// 저장할 파일 이름 (이름 + 확장자)
    pub fn file_name(&self) -> String {
        format!("{}{}", self.filename, self.extension)
    }

    pub fn to_bytes(&self) -> Bytes {
        let name = self.filename.as_bytes();
        let ext = self.extension.as_bytes();

        let mut buf = BytesMut::with_capacity(METADATA_HEADER_SIZE + name.len() + ext.len());
        buf.put_u32_le(name.len() as u32);
        buf.put_u32_le(ext.len() as u32);
        buf.put_u64_le(self.file_size);
        buf.put_slice(name);
        buf.put_slice(ext);
        buf.freeze()
    }

    /// 바이트열에서 파싱
    ///
    /// 길이 제한은 인코딩 시점에만 검사하고, 여기서는 범위와 UTF-8 만 확인한다.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < METADATA_HEADER_SIZE {
            return Err(Error::InvalidMetadata(format!(
                "헤더 부족: {} bytes",
                bytes.len()
            )));
        }

        let mut header = &bytes[..METADATA_HEADER_SIZE];
        let name_len = header.get_u32_le() as usize;
        let ext_len = header.get_u32_le() as usize;
        let file_size = header.get_u64_le();

        let body = &bytes[METADATA_HEADER_SIZE..];
        if body.len() < name_len.saturating_add(ext_len) {
            return Err(Error::InvalidMetadata(format!(
                "이름/확장자 길이 불일치: name={} ext={} available={}",
                name_len,
                ext_len,
                body.len()
            )));
        }

        let utf8 = |raw: &[u8]| {
            String::from_utf8(raw.to_vec())
                .map_err(|e| Error::InvalidMetadata(format!("UTF-8 아님: {e}")))
        };

        Ok(Self {
            filename: utf8(&body[..name_len])?,
            extension: utf8(&body[name_len..name_len + ext_len])?,
            file_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_layout() {
        let meta = Metadata::new("report", ".pdf", 1234).unwrap();
        let bytes = meta.to_bytes();

        assert_eq!(&bytes[0..4], &6u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &4u32.to_le_bytes());
        assert_eq!(&bytes[8..16], &1234u64.to_le_bytes());
        assert_eq!(&bytes[16..], b"report.pdf");
        assert_eq!(Metadata::from_bytes(&bytes).unwrap(), meta);
    }

    #[test]
    fn test_from_path() {
        let meta = Metadata::from_path(Path::new("/tmp/data/archive.tar.gz"), 10).unwrap();
        assert_eq!(meta.filename, "archive.tar");
        assert_eq!(meta.extension, ".gz");
        assert_eq!(meta.file_name(), "archive.tar.gz");
    }

    #[test]
    fn test_length_limits() {
        assert!(Metadata::new("", ".txt", 0).is_err());
        assert!(Metadata::new("a".repeat(100), ".txt", 0).is_err());
        assert!(Metadata::new("a".repeat(99), ".txt", 0).is_ok());
        assert!(Metadata::new("name", "", 0).is_err());
        assert!(Metadata::new("name", ".abcdefghi", 0).is_err());
        assert!(Metadata::new("name", ".abcdefgh", 0).is_ok());
        assert!(Metadata::from_path(Path::new("Makefile"), 0).is_err());
    }

    #[test]
    fn test_multibyte_names() {
        let meta = Metadata::new("보고서", ".txt", 99).unwrap();
        let bytes = meta.to_bytes();

        assert_eq!(&bytes[0..4], &9u32.to_le_bytes());
        assert_eq!(Metadata::from_bytes(&bytes).unwrap(), meta);
    }

    #[test]
    fn test_truncated_rejected() {
        let bytes = Metadata::new("name", ".bin", 1).unwrap().to_bytes();
        assert!(Metadata::from_bytes(&bytes[..10]).is_err());
        assert!(Metadata::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
