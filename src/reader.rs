//! 레코드 읽기 모듈
//!
//! JSON 배열, JSON Lines, CSV 파일에서 레코드를 한 건씩 스트리밍으로 읽습니다.
//! 파일 전체를 메모리에 올리지 않으며, JSON 배열도 원소 하나씩만 버퍼에 담습니다.

use memmap2::Mmap;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::{Location, Result, TabMergeError};
use crate::format::Format;
use crate::record::Record;

/// 이 크기 이상의 입력은 메모리 매핑으로 읽음
pub const DEFAULT_MMAP_THRESHOLD: u64 = 10 * 1024 * 1024;

const READ_BUFFER_SIZE: usize = 64 * 1024;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// 리더가 사용하는 바이트 입력
pub type Input = Box<dyn BufRead + Send>;

/// 입력 파일 열기
///
/// 대용량 파일은 메모리 매핑을, 그 외에는 버퍼 리더를 사용합니다.
pub fn open_input(path: &Path, mmap_threshold: u64) -> Result<Input> {
    let file = File::open(path).map_err(|e| TabMergeError::io(path, e))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);

    if size > 0 && size >= mmap_threshold {
        // 작업 중에는 입력 파일이 외부에서 수정되지 않는다고 가정
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| TabMergeError::io(path, e))?;
        return Ok(Box::new(Cursor::new(mmap)));
    }

    Ok(Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, file)))
}

/// 형식별 레코드 리더
///
/// 작업 구성 시점에 형식이 한 번 결정되고, 이후에는 `Iterator`로만 사용됩니다.
/// 첫 에러를 돌려준 뒤에는 더 이상 레코드를 내지 않습니다.
pub enum RecordReader {
    Json(JsonRecords<Input>),
    Jsonl(JsonLinesRecords<Input>),
    Csv(CsvRecords<Input>),
}

impl RecordReader {
    /// 파일을 열어 형식에 맞는 리더 생성
    pub fn open(path: &Path, format: Format, mmap_threshold: u64) -> Result<Self> {
        let input = open_input(path, mmap_threshold)?;
        Self::from_input(input, path, format)
    }

    /// 이미 열린 입력으로 리더 생성
    pub fn from_input(input: Input, path: &Path, format: Format) -> Result<Self> {
        let file = path.to_path_buf();
        Ok(match format {
            Format::Json => RecordReader::Json(JsonRecords::new(input, file)),
            Format::Jsonl => RecordReader::Jsonl(JsonLinesRecords::new(input, file)),
            Format::Csv => RecordReader::Csv(CsvRecords::new(input, file)?),
        })
    }

    pub fn format(&self) -> Format {
        match self {
            RecordReader::Json(_) => Format::Json,
            RecordReader::Jsonl(_) => Format::Jsonl,
            RecordReader::Csv(_) => Format::Csv,
        }
    }
}

impl Iterator for RecordReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RecordReader::Json(r) => r.next(),
            RecordReader::Jsonl(r) => r.next(),
            RecordReader::Csv(r) => r.next(),
        }
    }
}

/// `read_next` 결과를 한 번 실패하면 끝나는 반복자 항목으로 변환
fn fuse(done: &mut bool, result: Result<Option<Record>>) -> Option<Result<Record>> {
    match result {
        Ok(Some(record)) => Some(Ok(record)),
        Ok(None) => {
            *done = true;
            None
        }
        Err(e) => {
            *done = true;
            Some(Err(e))
        }
    }
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------
// JSON Lines
// ---------------------------------------------------------------------

/// JSON Lines 리더: 한 줄에 객체 하나, 빈 줄은 무시
pub struct JsonLinesRecords<R> {
    input: R,
    file: PathBuf,
    line: u64,
    offset: u64,
    buf: String,
    done: bool,
}

impl<R: BufRead> JsonLinesRecords<R> {
    pub fn new(input: R, file: PathBuf) -> Self {
        Self {
            input,
            file,
            line: 0,
            offset: 0,
            buf: String::new(),
            done: false,
        }
    }

    fn read_next(&mut self) -> Result<Option<Record>> {
        loop {
            self.buf.clear();
            let start = self.offset;
            let read = self.input.read_line(&mut self.buf).map_err(|e| {
                if e.kind() == io::ErrorKind::InvalidData {
                    TabMergeError::MalformedInput {
                        file: self.file.clone(),
                        location: Location::new(self.line + 1, start),
                        reason: "UTF-8이 아닌 데이터가 포함되어 있습니다".to_string(),
                    }
                } else {
                    TabMergeError::io(&self.file, e)
                }
            })?;

            if read == 0 {
                return Ok(None);
            }
            self.line += 1;
            self.offset += read as u64;

            let mut text = self.buf.as_str();
            let mut skipped = 0;
            if self.line == 1 {
                if let Some(rest) = text.strip_prefix('\u{feff}') {
                    skipped += UTF8_BOM.len();
                    text = rest;
                }
            }
            let trimmed = text.trim_start();
            skipped += text.len() - trimmed.len();
            let trimmed = trimmed.trim_end();
            if trimmed.is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(trimmed).map_err(|e| {
                let column = e.column().saturating_sub(1) as u64;
                TabMergeError::MalformedInput {
                    file: self.file.clone(),
                    location: Location::new(self.line, start + skipped as u64 + column),
                    reason: e.to_string(),
                }
            })?;

            return match value {
                Value::Object(map) => Ok(Some(Record::nested(map))),
                other => Err(TabMergeError::UnsupportedShape {
                    file: self.file.clone(),
                    reason: format!(
                        "{}번째 줄이 객체가 아닙니다 ({})",
                        self.line,
                        value_type(&other)
                    ),
                }),
            };
        }
    }
}

impl<R: BufRead> Iterator for JsonLinesRecords<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.read_next();
        fuse(&mut self.done, result)
    }
}

// ---------------------------------------------------------------------
// JSON (객체 배열 또는 객체 스트림)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonState {
    Start,
    /// `[` 직후
    ArrayFirst,
    /// 원소 하나를 읽은 뒤
    ArrayNext,
    /// 최상위에 객체가 연달아 오는 형태
    Stream,
    Done,
}

/// JSON 리더
///
/// 최상위가 객체 배열이거나 공백으로 구분된 객체의 나열이어야 합니다.
/// 원소의 경계만 바이트 단위로 찾고, 원소 하나의 파싱은 `serde_json`에 맡깁니다.
pub struct JsonRecords<R> {
    input: R,
    file: PathBuf,
    state: JsonState,
    line: u64,
    offset: u64,
    element: Vec<u8>,
}

impl<R: BufRead> JsonRecords<R> {
    pub fn new(input: R, file: PathBuf) -> Self {
        Self {
            input,
            file,
            state: JsonState::Start,
            line: 1,
            offset: 0,
            element: Vec::new(),
        }
    }

    fn read_next(&mut self) -> Result<Option<Record>> {
        loop {
            match self.state {
                JsonState::Start => {
                    self.skip_bom()?;
                    match self.next_significant()? {
                        None => {
                            self.state = JsonState::Done;
                            return Ok(None);
                        }
                        Some(b'[') => self.state = JsonState::ArrayFirst,
                        Some(b'{') => {
                            self.state = JsonState::Stream;
                            return self.read_object().map(Some);
                        }
                        Some(b) => return Err(self.top_level_error(b)),
                    }
                }
                JsonState::ArrayFirst => {
                    return match self.next_significant()? {
                        Some(b']') => {
                            self.finish_array()?;
                            Ok(None)
                        }
                        Some(b'{') => {
                            self.state = JsonState::ArrayNext;
                            self.read_object().map(Some)
                        }
                        other => Err(self.element_error(other)),
                    };
                }
                JsonState::ArrayNext => {
                    return match self.next_significant()? {
                        Some(b',') => match self.next_significant()? {
                            Some(b'{') => self.read_object().map(Some),
                            other => Err(self.element_error(other)),
                        },
                        Some(b']') => {
                            self.finish_array()?;
                            Ok(None)
                        }
                        Some(_) => Err(self.malformed_here(
                            "배열 원소 사이에는 ',' 또는 ']'가 와야 합니다",
                        )),
                        None => Err(self.malformed_here("배열이 닫히기 전에 파일이 끝났습니다")),
                    };
                }
                JsonState::Stream => {
                    return match self.next_significant()? {
                        None => {
                            self.state = JsonState::Done;
                            Ok(None)
                        }
                        Some(b'{') => self.read_object().map(Some),
                        Some(b) => Err(self.top_level_error(b)),
                    };
                }
                JsonState::Done => return Ok(None),
            }
        }
    }

    fn skip_bom(&mut self) -> Result<()> {
        let buf = self
            .input
            .fill_buf()
            .map_err(|e| TabMergeError::io(&self.file, e))?;
        if buf.starts_with(UTF8_BOM) {
            self.input.consume(UTF8_BOM.len());
            self.offset += UTF8_BOM.len() as u64;
        }
        Ok(())
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let buf = self
            .input
            .fill_buf()
            .map_err(|e| TabMergeError::io(&self.file, e))?;
        let Some(&b) = buf.first() else {
            return Ok(None);
        };
        self.input.consume(1);
        self.offset += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Ok(Some(b))
    }

    /// 공백을 건너뛴 다음 바이트
    fn next_significant(&mut self) -> Result<Option<u8>> {
        loop {
            match self.next_byte()? {
                Some(b) if b.is_ascii_whitespace() => continue,
                other => return Ok(other),
            }
        }
    }

    /// `{`를 읽은 직후 호출: 짝이 맞는 `}`까지 모아 파싱
    fn read_object(&mut self) -> Result<Record> {
        let start_offset = self.offset - 1;
        let start_line = self.line;

        self.element.clear();
        self.element.push(b'{');

        let mut depth = 1usize;
        let mut in_string = false;
        let mut escaped = false;

        loop {
            let buf = self
                .input
                .fill_buf()
                .map_err(|e| TabMergeError::io(&self.file, e))?;
            if buf.is_empty() {
                return Err(TabMergeError::MalformedInput {
                    file: self.file.clone(),
                    location: Location::new(start_line, start_offset),
                    reason: "객체가 닫히기 전에 파일이 끝났습니다".to_string(),
                });
            }

            let mut used = 0;
            let mut newlines = 0;
            let mut closed = false;
            for &b in buf {
                used += 1;
                if b == b'\n' {
                    newlines += 1;
                }
                if in_string {
                    if escaped {
                        escaped = false;
                    } else if b == b'\\' {
                        escaped = true;
                    } else if b == b'"' {
                        in_string = false;
                    }
                    continue;
                }
                match b {
                    b'"' => in_string = true,
                    b'{' | b'[' => depth += 1,
                    b'}' | b']' => {
                        depth -= 1;
                        if depth == 0 {
                            closed = true;
                            break;
                        }
                    }
                    _ => {}
                }
            }

            self.element.extend_from_slice(&buf[..used]);
            self.input.consume(used);
            self.offset += used as u64;
            self.line += newlines;

            if closed {
                break;
            }
        }

        let map: Map<String, Value> = serde_json::from_slice(&self.element).map_err(|e| {
            TabMergeError::MalformedInput {
                file: self.file.clone(),
                location: Location::new(
                    start_line + (e.line() as u64).saturating_sub(1),
                    start_offset,
                ),
                reason: e.to_string(),
            }
        })?;

        Ok(Record::nested(map))
    }

    fn finish_array(&mut self) -> Result<()> {
        self.state = JsonState::Done;
        match self.next_significant()? {
            None => Ok(()),
            Some(_) => Err(self.malformed_here("배열이 닫힌 뒤에 불필요한 내용이 있습니다")),
        }
    }

    fn element_error(&self, found: Option<u8>) -> TabMergeError {
        match found {
            None => self.malformed_here("배열이 닫히기 전에 파일이 끝났습니다"),
            Some(b']') => self.malformed_here("배열 끝에 불필요한 ','가 있습니다"),
            Some(b) if starts_value(b) => TabMergeError::UnsupportedShape {
                file: self.file.clone(),
                reason: format!("배열 원소가 객체가 아닙니다 (바이트 {})", self.offset - 1),
            },
            Some(_) => self.malformed_here("예상하지 못한 문자가 있습니다"),
        }
    }

    fn top_level_error(&self, found: u8) -> TabMergeError {
        if starts_value(found) {
            TabMergeError::UnsupportedShape {
                file: self.file.clone(),
                reason: "최상위 값이 객체 배열이나 객체 나열이 아닙니다".to_string(),
            }
        } else {
            self.malformed_here("예상하지 못한 문자가 있습니다")
        }
    }

    fn malformed_here(&self, reason: &str) -> TabMergeError {
        TabMergeError::MalformedInput {
            file: self.file.clone(),
            location: Location::new(self.line, self.offset.saturating_sub(1)),
            reason: reason.to_string(),
        }
    }
}

impl<R: BufRead> Iterator for JsonRecords<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == JsonState::Done {
            return None;
        }
        let mut done = false;
        let result = self.read_next();
        let item = fuse(&mut done, result);
        if done {
            self.state = JsonState::Done;
        }
        item
    }
}

/// JSON 값의 첫 바이트가 될 수 있는지
fn starts_value(b: u8) -> bool {
    matches!(b, b'[' | b'{' | b'"' | b'-' | b'0'..=b'9' | b't' | b'f' | b'n')
}

// ---------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------

/// CSV 리더: 헤더 행 필수, 모든 값은 문자열
pub struct CsvRecords<R> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    file: PathBuf,
    row: csv::StringRecord,
    done: bool,
}

impl<R: Read> CsvRecords<R> {
    pub fn new(input: R, file: PathBuf) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(input);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| csv_error(&file, e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut seen = HashSet::new();
        if let Some(dup) = headers.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(TabMergeError::MalformedInput {
                file,
                location: Location::line(1),
                reason: format!("중복된 헤더 이름: {}", dup),
            });
        }

        Ok(Self {
            reader,
            headers,
            file,
            row: csv::StringRecord::new(),
            done: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn read_next(&mut self) -> Result<Option<Record>> {
        let more = self
            .reader
            .read_record(&mut self.row)
            .map_err(|e| csv_error(&self.file, e))?;
        if !more {
            return Ok(None);
        }

        let fields: Map<String, Value> = self
            .headers
            .iter()
            .zip(self.row.iter())
            .map(|(name, value)| (name.clone(), Value::String(value.to_string())))
            .collect();

        Ok(Some(Record::flat(fields)))
    }
}

impl<R: Read> Iterator for CsvRecords<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.read_next();
        fuse(&mut self.done, result)
    }
}

fn csv_error(file: &Path, err: csv::Error) -> TabMergeError {
    let location = err
        .position()
        .map(|p| Location::new(p.line(), p.byte()))
        .unwrap_or_default();
    let reason = err.to_string();

    match err.into_kind() {
        csv::ErrorKind::Io(e) => TabMergeError::io(file, e),
        _ => TabMergeError::MalformedInput {
            file: file.to_path_buf(),
            location,
            reason,
        },
    }
}
