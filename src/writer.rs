//! 레코드 쓰기 모듈
//!
//! 확정된 스키마에 맞춰 레코드를 JSON, JSON Lines, CSV로 직렬화하고,
//! 분할 계획에 따라 여러 출력 파일로 나눕니다.

use serde::Serialize;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, TabMergeError};
use crate::flatten::{cell_text, Flattener};
use crate::format::Format;
use crate::record::Record;

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// 출력 분할 계획
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitPlan {
    /// 정확히 n개 파일로 고르게 분배 (앞쪽 파일이 한 건씩 더 받고, 레코드가 모자라면 빈 파일)
    ByFileCount(usize),
    /// 파일당 n건
    ByRowsPerFile(usize),
    /// 파일 크기가 n KB 이상이 되면 다음 파일로
    ByApproxSizeKB(u64),
}

impl SplitPlan {
    pub fn validate(&self) -> Result<()> {
        let positive = match self {
            SplitPlan::ByFileCount(n) | SplitPlan::ByRowsPerFile(n) => *n > 0,
            SplitPlan::ByApproxSizeKB(kb) => *kb > 0,
        };
        if positive {
            Ok(())
        } else {
            Err(TabMergeError::invalid_job(format!(
                "분할 기준은 0보다 커야 합니다: {}",
                self
            )))
        }
    }

    /// 전체 레코드 수를 미리 알아야 하는지
    pub fn needs_total(&self) -> bool {
        matches!(self, SplitPlan::ByFileCount(_))
    }
}

impl std::fmt::Display for SplitPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitPlan::ByFileCount(n) => write!(f, "파일 {}개", n),
            SplitPlan::ByRowsPerFile(n) => write!(f, "파일당 {}건", n),
            SplitPlan::ByApproxSizeKB(kb) => write!(f, "파일당 약 {} KB", kb),
        }
    }
}

/// 출력 위치
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// 정확한 파일 경로 하나
    File(PathBuf),
    /// `<dir>/<stem>_001.<ext>` 형태의 번호 붙은 파일들
    Numbered { dir: PathBuf, stem: String },
}

impl OutputTarget {
    pub fn path_for(&self, number: usize, format: Format) -> PathBuf {
        match self {
            OutputTarget::File(path) => path.clone(),
            OutputTarget::Numbered { dir, stem } => {
                dir.join(format!("{}_{:03}.{}", stem, number, format.extension()))
            }
        }
    }

    fn base(&self) -> &Path {
        match self {
            OutputTarget::File(path) => path,
            OutputTarget::Numbered { dir, .. } => dir,
        }
    }
}

/// 완성된 출력 파일 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputFile {
    pub path: PathBuf,
    pub records: u64,
    pub bytes: u64,
}

/// 쓰기 옵션
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkOptions {
    /// JSON 들여쓰기 출력
    pub pretty: bool,
    /// 기존 파일 덮어쓰기 허용
    pub overwrite: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            pretty: false,
            overwrite: true,
        }
    }
}

struct OpenFile {
    path: PathBuf,
    out: BufWriter<File>,
    records: u64,
    bytes: u64,
}

/// 레코드 출력기
///
/// 파일은 첫 레코드를 쓸 때 열리므로 행/크기 분할에서는 빈 꼬리 파일이 생기지 않습니다.
/// 분할하지 않는 경우에는 레코드가 없어도 빈 파일 하나를, 파일 개수 분할에서는 항상
/// 정확히 n개 파일을 남깁니다.
pub struct RecordSink {
    format: Format,
    target: OutputTarget,
    flattener: Flattener,
    plan: Option<SplitPlan>,
    total: Option<u64>,
    options: SinkOptions,
    header: Vec<u8>,
    csv: csv::WriterBuilder,
    scratch: Vec<u8>,
    current: Option<OpenFile>,
    completed: Vec<OutputFile>,
}

impl RecordSink {
    /// 출력기 생성
    ///
    /// `total`은 `ByFileCount` 분할에서 필수입니다.
    pub fn open(
        target: OutputTarget,
        format: Format,
        flattener: Flattener,
        plan: Option<SplitPlan>,
        total: Option<u64>,
        options: SinkOptions,
    ) -> Result<Self> {
        if let Some(plan) = plan {
            plan.validate()?;
            if plan.needs_total() && total.is_none() {
                return Err(TabMergeError::invalid_job(
                    "파일 개수 분할에는 전체 레코드 수가 필요합니다",
                ));
            }
        }

        let mut csv = csv::WriterBuilder::new();
        csv.terminator(csv::Terminator::Any(b'\n'));

        let header = match format {
            Format::Csv => {
                let mut header = Vec::new();
                // 빈 입력에서 나온 컬럼 없는 스키마는 헤더도 없음
                if !flattener.columns().is_empty() {
                    write_csv_row(&csv, flattener.column_names(), &mut header)
                        .map_err(|e| encode_error(target.base(), e))?;
                }
                header
            }
            Format::Json => b"[".to_vec(),
            Format::Jsonl => Vec::new(),
        };

        Ok(Self {
            format,
            target,
            flattener,
            plan,
            total,
            options,
            header,
            csv,
            scratch: Vec::new(),
            current: None,
            completed: Vec::new(),
        })
    }

    /// 레코드 한 건 쓰기
    ///
    /// 컬럼이 하나도 없는 CSV에는 행을 쓸 수 없으므로 파일을 열기 전에 실패합니다.
    pub fn write(&mut self, record: &Record) -> Result<()> {
        if self.format == Format::Csv && self.flattener.columns().is_empty() {
            return Err(TabMergeError::invalid_job(format!(
                "출력할 컬럼이 없어 CSV 행을 쓸 수 없습니다: {}",
                self.target.base().display()
            )));
        }
        self.encode(record)?;

        let file = match self.current.take() {
            Some(file) => file,
            None => self.open_file()?,
        };
        let file = self.current.insert(file);

        let separator: &[u8] = match self.format {
            Format::Json if file.records == 0 => b"\n",
            Format::Json => b",\n",
            _ => b"",
        };
        file.out
            .write_all(separator)
            .and_then(|_| file.out.write_all(&self.scratch))
            .map_err(|e| TabMergeError::io(&file.path, e))?;

        file.records += 1;
        file.bytes += (separator.len() + self.scratch.len()) as u64;

        if self.should_rotate() {
            self.close_current()?;
        }
        Ok(())
    }

    /// 남은 파일을 닫고 마무리
    pub fn finish(&mut self) -> Result<()> {
        if self.plan.is_none() && self.current.is_none() && self.completed.is_empty() {
            let file = self.open_file()?;
            self.current = Some(file);
        }
        self.close_current()?;

        // 할당량이 0인 나머지 파일
        if let Some(SplitPlan::ByFileCount(n)) = self.plan {
            while self.completed.len() < n {
                let file = self.open_file()?;
                self.current = Some(file);
                self.close_current()?;
            }
        }
        Ok(())
    }

    /// 쓰는 중인 파일을 닫고 삭제 (완성된 파일은 그대로)
    pub fn abort(&mut self) {
        if let Some(file) = self.current.take() {
            let path = file.path.clone();
            drop(file);
            remove_partial(&path);
        }
    }

    pub fn outputs(&self) -> &[OutputFile] {
        &self.completed
    }

    pub fn into_outputs(self) -> Vec<OutputFile> {
        self.completed
    }

    fn encode(&mut self, record: &Record) -> Result<()> {
        self.scratch.clear();
        let base = self.target.base();

        match self.format {
            Format::Csv => {
                let cells: Vec<String> = self
                    .flattener
                    .flatten(record)
                    .iter()
                    .map(cell_text)
                    .collect();
                write_csv_row(&self.csv, &cells, &mut self.scratch)
                    .map_err(|e| encode_error(base, e))?;
            }
            Format::Jsonl => {
                let object = self.flattener.project(record);
                serde_json::to_writer(&mut self.scratch, &object)
                    .map_err(|e| encode_error(base, e))?;
                self.scratch.push(b'\n');
            }
            Format::Json => {
                let object = self.flattener.project(record);
                if self.options.pretty {
                    let text = serde_json::to_string_pretty(&Value::Object(object))
                        .map_err(|e| encode_error(base, e))?;
                    for (i, line) in text.lines().enumerate() {
                        if i > 0 {
                            self.scratch.push(b'\n');
                        }
                        self.scratch.extend_from_slice(b"  ");
                        self.scratch.extend_from_slice(line.as_bytes());
                    }
                } else {
                    serde_json::to_writer(&mut self.scratch, &object)
                        .map_err(|e| encode_error(base, e))?;
                }
            }
        }
        Ok(())
    }

    fn should_rotate(&self) -> bool {
        let Some(file) = self.current.as_ref() else {
            return false;
        };
        match self.plan {
            None => false,
            Some(SplitPlan::ByRowsPerFile(n)) => file.records >= n as u64,
            Some(SplitPlan::ByApproxSizeKB(kb)) => file.bytes >= kb.saturating_mul(1024),
            Some(SplitPlan::ByFileCount(n)) => {
                let total = self.total.unwrap_or(0);
                let index = self.completed.len();
                // 마지막 파일은 남은 레코드를 모두 받음
                index + 1 < n && file.records >= file_quota(total, n, index)
            }
        }
    }

    fn open_file(&self) -> Result<OpenFile> {
        let path = self
            .target
            .path_for(self.completed.len() + 1, self.format);

        if !self.options.overwrite && path.exists() {
            return Err(TabMergeError::OutputExists { path });
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| TabMergeError::io(parent, e))?;
        }

        let file = File::create(&path).map_err(|e| TabMergeError::io(&path, e))?;
        let mut out = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        out.write_all(&self.header)
            .map_err(|e| TabMergeError::io(&path, e))?;

        debug!(file = %path.display(), "출력 파일 열기");
        Ok(OpenFile {
            path,
            out,
            records: 0,
            bytes: self.header.len() as u64,
        })
    }

    fn close_current(&mut self) -> Result<()> {
        let Some(mut file) = self.current.take() else {
            return Ok(());
        };

        let closing: &[u8] = match self.format {
            Format::Json if file.records == 0 => b"]\n",
            Format::Json => b"\n]\n",
            _ => b"",
        };

        let result = file
            .out
            .write_all(closing)
            .and_then(|_| file.out.flush());
        if let Err(e) = result {
            drop(file.out);
            remove_partial(&file.path);
            return Err(TabMergeError::io(&file.path, e));
        }

        debug!(
            file = %file.path.display(),
            records = file.records,
            "출력 파일 완료"
        );
        self.completed.push(OutputFile {
            path: file.path,
            records: file.records,
            bytes: file.bytes + closing.len() as u64,
        });
        Ok(())
    }
}

/// `ByFileCount`에서 `index`번째 파일(0부터)이 받을 레코드 수
///
/// # Examples
/// ```
/// use tabmerge::writer::file_quota;
///
/// // 10건을 3개 파일로: 4, 3, 3
/// assert_eq!(file_quota(10, 3, 0), 4);
/// assert_eq!(file_quota(10, 3, 1), 3);
/// assert_eq!(file_quota(10, 3, 2), 3);
/// ```
pub fn file_quota(total: u64, files: usize, index: usize) -> u64 {
    let files = files.max(1) as u64;
    let base = total / files;
    let extra = total % files;
    base + u64::from((index as u64) < extra)
}

/// 미완성 출력 파일 삭제 (실패는 경고만 남기고 원래 에러를 유지)
fn remove_partial(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(file = %path.display(), "미완성 출력 파일 삭제");
            true
        }
        Err(e) => {
            warn!(file = %path.display(), error = %e, "미완성 출력 파일 삭제 실패");
            false
        }
    }
}

/// CSV 한 행을 `out` 뒤에 덧붙임
fn write_csv_row<I, T>(builder: &csv::WriterBuilder, row: I, out: &mut Vec<u8>) -> csv::Result<()>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = builder.from_writer(out);
    writer.write_record(row)?;
    writer.flush()?;
    Ok(())
}

fn encode_error(base: &Path, err: impl std::fmt::Display) -> TabMergeError {
    TabMergeError::Io {
        file: base.to_path_buf(),
        reason: format!("직렬화 실패: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flatten::{ArrayMode, Flattener};
    use serde_json::{json, Map};
    use tempfile::TempDir;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => Record::nested(map),
            _ => panic!("object expected"),
        }
    }

    fn columns(names: &[&str]) -> Flattener {
        Flattener::from_names(names, ArrayMode::Indexed)
    }

    fn write_all(sink: &mut RecordSink, count: usize) {
        for i in 0..count {
            sink.write(&record(json!({"id": i, "name": format!("n{}", i)})))
                .unwrap();
        }
        sink.finish().unwrap();
    }

    #[test]
    fn test_csv_header_and_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");
        let mut sink = RecordSink::open(
            OutputTarget::File(path.clone()),
            Format::Csv,
            columns(&["id", "name", "missing"]),
            None,
            None,
            SinkOptions::default(),
        )
        .unwrap();

        sink.write(&record(json!({"id": 1, "name": "a, b"}))).unwrap();
        sink.finish().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id,name,missing\n1,\"a, b\",\n");
        assert_eq!(sink.outputs()[0].bytes, content.len() as u64);
    }

    #[test]
    fn test_json_array_framing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.json");
        let mut sink = RecordSink::open(
            OutputTarget::File(path.clone()),
            Format::Json,
            columns(&["id", "name"]),
            None,
            None,
            SinkOptions::default(),
        )
        .unwrap();
        write_all(&mut sink, 2);

        let content = fs::read_to_string(&path).unwrap();
        let value: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(
            value,
            json!([{"id": 0, "name": "n0"}, {"id": 1, "name": "n1"}])
        );
        assert_eq!(sink.outputs()[0].bytes, content.len() as u64);
    }

    #[test]
    fn test_empty_unsplit_output_still_written() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.json");
        let mut sink = RecordSink::open(
            OutputTarget::File(path.clone()),
            Format::Json,
            columns(&["id"]),
            None,
            None,
            SinkOptions::default(),
        )
        .unwrap();
        sink.finish().unwrap();

        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value, json!([]));
    }

    #[test]
    fn test_jsonl_rebuilds_nested_columns() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.jsonl");
        let mut sink = RecordSink::open(
            OutputTarget::File(path.clone()),
            Format::Jsonl,
            columns(&["a.b[0]", "a.b[1]"]),
            None,
            None,
            SinkOptions::default(),
        )
        .unwrap();
        sink.write(&record(json!({"a": {"b": [1, 2]}}))).unwrap();
        sink.finish().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\"a\":{\"b\":[1,2]}}\n");
    }

    #[test]
    fn test_split_by_rows() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = RecordSink::open(
            OutputTarget::Numbered {
                dir: temp_dir.path().to_path_buf(),
                stem: "part".to_string(),
            },
            Format::Jsonl,
            columns(&["id"]),
            Some(SplitPlan::ByRowsPerFile(3)),
            None,
            SinkOptions::default(),
        )
        .unwrap();
        write_all(&mut sink, 7);

        let counts: Vec<u64> = sink.outputs().iter().map(|o| o.records).collect();
        assert_eq!(counts, vec![3, 3, 1]);
        assert!(temp_dir.path().join("part_003.jsonl").exists());
    }

    #[test]
    fn test_split_by_rows_exact_multiple_has_no_empty_tail() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = RecordSink::open(
            OutputTarget::Numbered {
                dir: temp_dir.path().to_path_buf(),
                stem: "part".to_string(),
            },
            Format::Csv,
            columns(&["id"]),
            Some(SplitPlan::ByRowsPerFile(2)),
            None,
            SinkOptions::default(),
        )
        .unwrap();
        write_all(&mut sink, 4);

        assert_eq!(sink.outputs().len(), 2);
        let second = fs::read_to_string(temp_dir.path().join("part_002.csv")).unwrap();
        assert_eq!(second, "id\n2\n3\n");
    }

    #[test]
    fn test_split_by_file_count() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = RecordSink::open(
            OutputTarget::Numbered {
                dir: temp_dir.path().to_path_buf(),
                stem: "part".to_string(),
            },
            Format::Jsonl,
            columns(&["id"]),
            Some(SplitPlan::ByFileCount(3)),
            Some(10),
            SinkOptions::default(),
        )
        .unwrap();
        write_all(&mut sink, 10);

        let counts: Vec<u64> = sink.outputs().iter().map(|o| o.records).collect();
        assert_eq!(counts, vec![4, 3, 3]);
    }

    #[test]
    fn test_split_by_file_count_with_few_records() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = RecordSink::open(
            OutputTarget::Numbered {
                dir: temp_dir.path().to_path_buf(),
                stem: "part".to_string(),
            },
            Format::Csv,
            columns(&["id"]),
            Some(SplitPlan::ByFileCount(5)),
            Some(2),
            SinkOptions::default(),
        )
        .unwrap();
        write_all(&mut sink, 2);

        let counts: Vec<u64> = sink.outputs().iter().map(|o| o.records).collect();
        assert_eq!(counts, vec![1, 1, 0, 0, 0]);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("part_002.csv")).unwrap(),
            "id\n1\n"
        );
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("part_005.csv")).unwrap(),
            "id\n"
        );
    }

    #[test]
    fn test_split_by_file_count_extra_records_go_last() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = RecordSink::open(
            OutputTarget::Numbered {
                dir: temp_dir.path().to_path_buf(),
                stem: "part".to_string(),
            },
            Format::Json,
            columns(&["id"]),
            Some(SplitPlan::ByFileCount(3)),
            Some(2),
            SinkOptions::default(),
        )
        .unwrap();
        // 스캔 이후 늘어난 레코드
        write_all(&mut sink, 4);

        let counts: Vec<u64> = sink.outputs().iter().map(|o| o.records).collect();
        assert_eq!(counts, vec![1, 1, 2]);
    }

    #[test]
    fn test_csv_without_columns_fails_before_opening() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");
        let mut sink = RecordSink::open(
            OutputTarget::File(path.clone()),
            Format::Csv,
            Flattener::from_names::<&str>(&[], ArrayMode::Indexed),
            None,
            None,
            SinkOptions::default(),
        )
        .unwrap();

        let err = sink.write(&record(json!({"id": 1}))).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidJob);
        assert!(!path.exists());
    }

    #[test]
    fn test_split_by_size_overshoots_by_at_most_one_record() {
        let temp_dir = TempDir::new().unwrap();
        let mut sink = RecordSink::open(
            OutputTarget::Numbered {
                dir: temp_dir.path().to_path_buf(),
                stem: "part".to_string(),
            },
            Format::Jsonl,
            columns(&["id", "pad"]),
            Some(SplitPlan::ByApproxSizeKB(1)),
            None,
            SinkOptions::default(),
        )
        .unwrap();

        let pad = "x".repeat(300);
        for i in 0..10 {
            sink.write(&record(json!({"id": i, "pad": pad}))).unwrap();
        }
        sink.finish().unwrap();

        let outputs = sink.outputs();
        assert!(outputs.len() >= 3);
        let record_size = outputs[0].bytes / outputs[0].records;
        for output in &outputs[..outputs.len() - 1] {
            assert!(output.bytes >= 1024);
            assert!(output.bytes < 1024 + record_size + 1);
        }
    }

    #[test]
    fn test_error_mode_refuses_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.jsonl");
        fs::write(&path, "keep").unwrap();

        let mut sink = RecordSink::open(
            OutputTarget::File(path.clone()),
            Format::Jsonl,
            columns(&["id"]),
            None,
            None,
            SinkOptions {
                overwrite: false,
                ..SinkOptions::default()
            },
        )
        .unwrap();
        let err = sink.write(&Record::nested(Map::new())).unwrap_err();
        assert!(matches!(err, TabMergeError::OutputExists { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep");
    }

    #[test]
    fn test_abort_removes_in_progress_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.csv");
        let mut sink = RecordSink::open(
            OutputTarget::File(path.clone()),
            Format::Csv,
            columns(&["id"]),
            None,
            None,
            SinkOptions::default(),
        )
        .unwrap();
        sink.write(&record(json!({"id": 1}))).unwrap();
        sink.abort();

        assert!(!path.exists());
        assert!(sink.outputs().is_empty());
    }

    #[test]
    fn test_remove_partial_reports_failure() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("half.jsonl");
        fs::write(&path, "{").unwrap();

        assert!(remove_partial(&path));
        assert!(!path.exists());
        assert!(!remove_partial(&path));
    }

    #[test]
    fn test_invalid_plans() {
        let target = OutputTarget::File(PathBuf::from("unused.jsonl"));
        let open = |plan, total| {
            RecordSink::open(
                target.clone(),
                Format::Jsonl,
                columns(&["id"]),
                Some(plan),
                total,
                SinkOptions::default(),
            )
        };
        assert!(open(SplitPlan::ByRowsPerFile(0), None).is_err());
        assert!(open(SplitPlan::ByFileCount(2), None).is_err());
        assert!(open(SplitPlan::ByFileCount(2), Some(5)).is_ok());
    }
}
