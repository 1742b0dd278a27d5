//! 에러 타입 정의 모듈
//!
//! tabmerge 엔진에서 발생할 수 있는 모든 에러 타입을 정의합니다.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// 입력 파일 내 오류 위치
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    /// 1부터 시작하는 줄 번호
    pub line: Option<u64>,
    /// 0부터 시작하는 바이트 오프셋
    pub byte: Option<u64>,
}

impl Location {
    pub fn new(line: u64, byte: u64) -> Self {
        Self {
            line: Some(line),
            byte: Some(byte),
        }
    }

    pub fn line(line: u64) -> Self {
        Self {
            line: Some(line),
            byte: None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.byte) {
            (Some(line), Some(byte)) => write!(f, "{}번째 줄, 바이트 {}", line, byte),
            (Some(line), None) => write!(f, "{}번째 줄", line),
            (None, Some(byte)) => write!(f, "바이트 {}", byte),
            (None, None) => write!(f, "위치 미상"),
        }
    }
}

/// 사용자에게 노출되는 에러 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidJob,
    MalformedInput,
    UnsupportedShape,
    NoInput,
    Io,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidJob => "InvalidJobError",
            ErrorKind::MalformedInput => "MalformedInputError",
            ErrorKind::UnsupportedShape => "UnsupportedShapeError",
            ErrorKind::NoInput => "NoInputError",
            ErrorKind::Io => "IOError",
            ErrorKind::Cancelled => "CancelledError",
        };
        f.write_str(name)
    }
}

/// tabmerge에서 발생할 수 있는 에러 타입
#[derive(Error, Debug)]
pub enum TabMergeError {
    /// 작업 구성이 잘못됨 (입출력 전에 검출)
    #[error("잘못된 작업 구성: {reason}")]
    InvalidJob { reason: String },

    /// 출력 파일이 이미 존재 (Error 모드에서)
    #[error("출력 파일이 이미 존재합니다: {path}")]
    OutputExists { path: PathBuf },

    /// 유효하지 않은 패턴
    #[error("유효하지 않은 패턴: {pattern}")]
    InvalidPattern { pattern: String },

    /// JSON/CSV 구문 오류
    #[error("입력 구문 오류 ({file}, {location}): {reason}")]
    MalformedInput {
        file: PathBuf,
        location: Location,
        reason: String,
    },

    /// 구문은 올바르지만 최상위 구조가 레코드 목록이 아님
    #[error("지원하지 않는 데이터 구조 ({file}): {reason}")]
    UnsupportedShape { file: PathBuf, reason: String },

    /// 입력 목록이 비어 있음
    #[error("처리할 입력 파일이 없습니다")]
    NoInput,

    /// 파일 입출력 실패
    #[error("파일 입출력 실패 ({file}): {reason}")]
    Io { file: PathBuf, reason: String },

    /// 호출자가 작업을 취소함
    #[error("작업이 취소되었습니다")]
    Cancelled,
}

impl TabMergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TabMergeError::InvalidJob { .. }
            | TabMergeError::OutputExists { .. }
            | TabMergeError::InvalidPattern { .. } => ErrorKind::InvalidJob,
            TabMergeError::MalformedInput { .. } => ErrorKind::MalformedInput,
            TabMergeError::UnsupportedShape { .. } => ErrorKind::UnsupportedShape,
            TabMergeError::NoInput => ErrorKind::NoInput,
            TabMergeError::Io { .. } => ErrorKind::Io,
            TabMergeError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// 문제가 된 파일 경로 (있는 경우)
    pub fn file(&self) -> Option<&PathBuf> {
        match self {
            TabMergeError::OutputExists { path } => Some(path),
            TabMergeError::MalformedInput { file, .. }
            | TabMergeError::UnsupportedShape { file, .. }
            | TabMergeError::Io { file, .. } => Some(file),
            _ => None,
        }
    }

    /// 오류 위치 (구문 오류인 경우)
    pub fn location(&self) -> Option<Location> {
        match self {
            TabMergeError::MalformedInput { location, .. } => Some(*location),
            _ => None,
        }
    }

    pub(crate) fn invalid_job(reason: impl Into<String>) -> Self {
        TabMergeError::InvalidJob {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(file: impl Into<PathBuf>, err: std::io::Error) -> Self {
        TabMergeError::Io {
            file: file.into(),
            reason: err.to_string(),
        }
    }
}

/// tabmerge 결과 타입 별칭
pub type Result<T> = std::result::Result<T, TabMergeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        assert_eq!(Location::new(3, 42).to_string(), "3번째 줄, 바이트 42");
        assert_eq!(Location::line(7).to_string(), "7번째 줄");
        assert_eq!(Location::default().to_string(), "위치 미상");
    }

    #[test]
    fn test_kind_mapping() {
        let err = TabMergeError::OutputExists {
            path: PathBuf::from("out.csv"),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidJob);
        assert_eq!(err.file(), Some(&PathBuf::from("out.csv")));

        let err = TabMergeError::MalformedInput {
            file: PathBuf::from("bad.jsonl"),
            location: Location::new(2, 17),
            reason: "unexpected token".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(err.location(), Some(Location::new(2, 17)));
        let msg = err.to_string();
        assert!(msg.contains("bad.jsonl"));
        assert!(msg.contains("2번째 줄"));
    }
}
