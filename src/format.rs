//! 파일 형식 모듈
//!
//! 지원 형식(JSON, JSON Lines, CSV)과 확장자/내용 기반 형식 감지를 담당합니다.

use clap::ValueEnum;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{Result, TabMergeError};

/// 레코드 파일 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// 객체 배열 하나로 된 JSON
    Json,
    /// 한 줄에 객체 하나인 JSON Lines
    Jsonl,
    /// 헤더 행이 있는 쉼표 구분 CSV
    Csv,
}

impl Format {
    /// 출력 파일 확장자
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Jsonl => "jsonl",
            Format::Csv => "csv",
        }
    }

    /// 확장자로 형식 판별 (대소문자 무시)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "jsonl" | "ndjson" => Some(Format::Jsonl),
            "csv" => Some(Format::Csv),
            _ => None,
        }
    }

    /// 평면 컬럼이 필요한 형식인지 여부
    pub fn is_tabular(&self) -> bool {
        matches!(self, Format::Csv)
    }

    /// 파일 형식 감지
    ///
    /// 확장자를 먼저 보고, 알 수 없으면 첫 공백 아닌 바이트와 첫 줄을 살펴봅니다.
    pub fn detect(path: &Path) -> Result<Self> {
        if let Some(format) = path
            .extension()
            .and_then(|s| s.to_str())
            .and_then(Format::from_extension)
        {
            return Ok(format);
        }

        let file = File::open(path).map_err(|e| TabMergeError::io(path, e))?;
        let mut sample = Vec::with_capacity(4096);
        BufReader::new(file)
            .take(4096)
            .read_to_end(&mut sample)
            .map_err(|e| TabMergeError::io(path, e))?;

        sniff(&sample).ok_or_else(|| {
            TabMergeError::invalid_job(format!(
                "파일 형식을 알 수 없습니다: {}",
                path.display()
            ))
        })
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Json => write!(f, "JSON"),
            Format::Jsonl => write!(f, "JSONL"),
            Format::Csv => write!(f, "CSV"),
        }
    }
}

/// 파일 앞부분으로 형식 추정
fn sniff(sample: &[u8]) -> Option<Format> {
    let body = sample.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(sample);
    match body.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'[') | Some(b'{') => Some(Format::Json),
        Some(_) => {
            let mut rest = body;
            let mut first_line = String::new();
            rest.read_line(&mut first_line).ok()?;
            first_line.contains(',').then_some(Format::Csv)
        }
        None => None,
    }
}
