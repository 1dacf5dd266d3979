//! 수신측 데이터 처리 (클라이언트측)
//!
//! 순서대로 검증된 페이로드만 넘겨받는다. 첫 페이로드는 메타데이터이고
//! 이후 페이로드는 파일에 이어 쓴다.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::file::FileSink;
use crate::metadata::Metadata;
use crate::{Error, Result};

/// 파일 수신자
#[derive(Debug)]
pub struct FileReceiver {
    output_dir: PathBuf,
    metadata: Option<Metadata>,
    sink: Option<FileSink>,
}

impl FileReceiver {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            metadata: None,
            sink: None,
        }
    }

    /// 순서대로 도착한 페이로드 처리
    pub fn deliver(&mut self, payload: &[u8]) -> Result<()> {
        match self.sink.as_mut() {
            Some(sink) => sink.write(payload),
            None => self.start(payload),
        }
    }

    fn start(&mut self, payload: &[u8]) -> Result<()> {
        let metadata = Metadata::from_bytes(payload)?;
        let file_name = metadata.file_name();

        // 피어가 보낸 이름이 출력 디렉토리를 벗어나지 못하게
        if Path::new(&file_name).file_name().map(|n| n != file_name.as_str()).unwrap_or(true) {
            return Err(Error::InvalidMetadata(format!("잘못된 파일 이름: {:?}", file_name)));
        }

        let path = self.output_dir.join(&file_name);
        info!("수신 시작: {:?} ({} bytes)", path, metadata.file_size);

        self.sink = Some(FileSink::create(&path, metadata.file_size)?);
        self.metadata = Some(metadata);
        Ok(())
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// 메타데이터를 받았고 선언된 크기만큼 기록했는지
    pub fn is_complete(&self) -> bool {
        self.sink.as_ref().is_some_and(FileSink::is_complete)
    }

    pub fn bytes_written(&self) -> u64 {
        self.sink.as_ref().map_or(0, FileSink::bytes_written)
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.sink.as_ref().map(FileSink::path)
    }
}
