//! 파일 입출력 협력자
//!
//! - [`FileSource`]: 송신할 파일을 고정 크기 청크로 제공 (0번은 메타데이터)
//! - [`FileSink`]: 수신한 바이트를 순서대로 기록

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::metadata::Metadata;
use crate::{Error, Result};

/// 청크를 읽어 올 원본
#[derive(Debug, Clone)]
enum Content {
    Memory(Bytes),

    /// 청크 요청 시 위치를 옮겨 읽음 (복제본끼리 핸들 공유)
    Disk(Arc<Mutex<File>>),
}

/// 송신 파일
#[derive(Debug, Clone)]
pub struct FileSource {
    metadata: Metadata,
    content: Content,
    size: u64,
    chunk_size: usize,
}

impl FileSource {
    /// 디스크 파일 열기 (내용은 청크 단위로 필요할 때 읽음)
    pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        let metadata = Metadata::from_path(path, size)?;
        debug!("file opened: {:?} ({} bytes)", path, size);

        Self::with_content(metadata, Content::Disk(Arc::new(Mutex::new(file))), size, chunk_size)
    }

    /// 메모리 데이터로 생성 (`name` 은 "이름.확장자")
    pub fn from_bytes(name: &str, data: impl Into<Bytes>, chunk_size: usize) -> Result<Self> {
        let data: Bytes = data.into();
        let size = data.len() as u64;
        let metadata = Metadata::from_path(Path::new(name), size)?;
        Self::with_content(metadata, Content::Memory(data), size, chunk_size)
    }

    fn with_content(metadata: Metadata, content: Content, size: u64, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size 는 1 이상".into()));
        }

        Ok(Self {
            metadata,
            content,
            size,
            chunk_size,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 데이터 청크 수 (메타데이터 제외)
    pub fn total_chunks(&self) -> u64 {
        self.size.div_ceil(self.chunk_size as u64)
    }

    /// 청크 조회 (0 = 메타데이터, 1.. = 파일 조각)
    pub fn get_chunk(&self, index: u64) -> Result<Bytes> {
        let total = self.total_chunks();
        if index == 0 {
            return Ok(self.metadata.to_bytes());
        }
        if index > total {
            return Err(Error::ChunkOutOfRange { index, total });
        }

        let start = (index - 1) * self.chunk_size as u64;
        let len = (self.size - start).min(self.chunk_size as u64) as usize;

        match &self.content {
            Content::Memory(data) => Ok(data.slice(start as usize..start as usize + len)),
            Content::Disk(file) => {
                let mut buf = vec![0u8; len];
                let mut file = file.lock();
                file.seek(SeekFrom::Start(start))?;
                file.read_exact(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

/// 수신 파일
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    expected: u64,
    written: u64,
}

impl FileSink {
    /// 파일 생성 (기존 파일은 덮어씀)
    pub fn create(path: impl AsRef<Path>, expected: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;

        let mut sink = Self {
            path,
            writer: Some(BufWriter::new(file)),
            expected,
            written: 0,
        };
        sink.finish_if_complete()?;
        Ok(sink)
    }

    /// 순서대로 이어 쓰기
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let written = self.written + data.len() as u64;
        if written > self.expected {
            return Err(Error::SinkOverflow {
                written,
                expected: self.expected,
            });
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(data)?;
        }
        self.written = written;
        self.finish_if_complete()
    }

    fn finish_if_complete(&mut self) -> Result<()> {
        if self.is_complete() {
            if let Some(mut writer) = self.writer.take() {
                writer.flush()?;
                debug!("file complete: {:?} ({} bytes)", self.path, self.written);
            }
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.written == self.expected
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
