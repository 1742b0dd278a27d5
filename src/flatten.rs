//! 평탄화 모듈
//!
//! 중첩 필드를 평면 컬럼으로 펼치고(스키마/레코드 수준), 평면 컬럼에서 중첩 객체를
//! 다시 만드는 역변환을 담당합니다.

use clap::ValueEnum;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::reconcile::MergedSchema;
use crate::record::{parse_path, PathSegment, Record};
use crate::schema::{FieldInfo, SourceSchema};

/// 배열 필드 평탄화 방식
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayMode {
    /// 관찰된 최대 인덱스까지 `field[0]`, `field[1]`, ... 컬럼으로 펼침
    #[default]
    Indexed,
    /// 배열 전체를 JSON 문자열 하나의 `field` 컬럼으로 접음
    Joined,
}

/// 출력 컬럼 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    segments: Vec<PathSegment>,
}

impl Column {
    /// 이름을 경로 표기로 해석한 컬럼
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let segments = parse_path(&name);
        Self { name, segments }
    }

    /// 스키마 스캔에서 기록된 구간을 그대로 쓰는 컬럼
    pub fn from_field(field: &FieldInfo) -> Self {
        Self {
            name: field.path.clone(),
            segments: field.segments.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    fn under_array(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, PathSegment::Index(_)))
    }
}

/// 스키마에서 결정된 최종 컬럼 목록과 레코드 변환기
#[derive(Debug, Clone, PartialEq)]
pub struct Flattener {
    columns: Vec<Column>,
    array_mode: ArrayMode,
}

impl Flattener {
    /// 조정된 스키마로부터 (스키마에 기록된 배열 방식을 사용)
    pub fn for_schema(schema: &MergedSchema) -> Self {
        Self::from_fields(schema.fields(), schema.array_mode())
    }

    /// 소스 스키마 하나로부터 (Keep Separate, 단일 입력 분할)
    pub fn for_source(schema: &SourceSchema, array_mode: ArrayMode) -> Self {
        Self::from_fields(schema.fields(), array_mode)
    }

    /// 필드 목록을 평면 컬럼으로 펼침
    ///
    /// 객체는 말단 스칼라 컬럼으로 대체되고, 배열은 방식에 따라 인덱스 컬럼 또는
    /// 단일 컬럼이 됩니다. 순서는 필드 목록의 순서를 따릅니다.
    /// 평면 입력의 컬럼은 이름에 `[n]`이 있어도 배열 원소로 보지 않습니다.
    pub fn from_fields(fields: &[FieldInfo], array_mode: ArrayMode) -> Self {
        let columns = fields
            .iter()
            .filter_map(|field| {
                let column = Column::from_field(field);
                let keep = match array_mode {
                    ArrayMode::Indexed => field.shape.is_leaf(),
                    ArrayMode::Joined => {
                        (field.shape.flat || !column.under_array())
                            && (field.shape.is_leaf() || field.shape.array)
                    }
                };
                keep.then_some(column)
            })
            .collect();

        Self {
            columns,
            array_mode,
        }
    }

    /// 이름 목록으로 직접 구성
    pub fn from_names<S: AsRef<str>>(names: &[S], array_mode: ArrayMode) -> Self {
        Self {
            columns: names.iter().map(|n| Column::new(n.as_ref())).collect(),
            array_mode,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn array_mode(&self) -> ArrayMode {
        self.array_mode
    }

    /// 레코드를 컬럼 순서의 값 목록으로 변환
    ///
    /// 레코드에 없는 컬럼은 null이 되며, 결과 길이는 항상 컬럼 수와 같습니다.
    pub fn flatten(&self, record: &Record) -> Vec<Value> {
        self.columns
            .iter()
            .map(|c| {
                record
                    .value_at(&c.name, &c.segments)
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect()
    }

    /// 평면 값 목록에서 중첩 객체 재구성
    ///
    /// `restore_types`가 참이면 CSV 문자열 값을 원래 타입으로 되돌립니다.
    pub fn reconstruct(&self, cells: &[Value], restore_types: bool) -> Map<String, Value> {
        let mut root = Value::Object(Map::new());
        for (column, cell) in self.columns.iter().zip(cells) {
            let value = match cell {
                Value::String(text) if restore_types => restore_scalar(text),
                other => other.clone(),
            };
            insert_at(&mut root, &column.segments, value);
        }
        match root {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// 레코드를 스키마에 맞춘 JSON 객체로 변환
    pub fn project(&self, record: &Record) -> Map<String, Value> {
        self.reconstruct(&self.flatten(record), record.is_flat())
    }
}

/// 중첩 구조 안의 경로에 값 삽입
///
/// 누락으로 생긴 null은 이미 있는 값을 덮어쓰지 않고, 필요한 중간 컨테이너는 만들어 채웁니다.
fn insert_at(target: &mut Value, segments: &[PathSegment], value: Value) {
    let Some((segment, rest)) = segments.split_first() else {
        if !(value.is_null() && !target.is_null()) {
            *target = value;
        }
        return;
    };

    match segment {
        PathSegment::Key(key) => {
            if !target.is_object() {
                if value.is_null() && !target.is_null() {
                    return;
                }
                *target = Value::Object(Map::new());
            }
            if let Value::Object(map) = target {
                let slot = map.entry(key.clone()).or_insert(Value::Null);
                insert_at(slot, rest, value);
            }
        }
        PathSegment::Index(index) => {
            if !target.is_array() {
                if value.is_null() && !target.is_null() {
                    return;
                }
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(items) = target {
                if items.len() <= *index {
                    items.resize(index + 1, Value::Null);
                }
                insert_at(&mut items[*index], rest, value);
            }
        }
    }
}

/// CSV 문자열 값을 JSON 타입으로 복원
///
/// # Examples
/// ```
/// use serde_json::json;
/// use tabmerge::flatten::restore_scalar;
///
/// assert_eq!(restore_scalar(""), json!(null));
/// assert_eq!(restore_scalar("42"), json!(42));
/// assert_eq!(restore_scalar("007"), json!("007"));
/// assert_eq!(restore_scalar("TRUE"), json!(true));
/// assert_eq!(restore_scalar("[1,2]"), json!([1, 2]));
/// ```
pub fn restore_scalar(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    if text.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    if let Ok(n) = text.parse::<i64>() {
        if n.to_string() == text {
            return Value::Number(n.into());
        }
    } else if let Ok(n) = text.parse::<u64>() {
        if n.to_string() == text {
            return Value::Number(n.into());
        }
    }

    if looks_like_float(text) {
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }

    if text.starts_with('[') || text.starts_with('{') {
        if let Ok(value) = serde_json::from_str::<Value>(text) {
            return value;
        }
    }

    Value::String(text.to_string())
}

fn looks_like_float(text: &str) -> bool {
    let body = text.strip_prefix('-').unwrap_or(text);
    body.starts_with(|c: char| c.is_ascii_digit())
        && body.contains(['.', 'e', 'E'])
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
}

/// CSV 셀 텍스트
///
/// null은 빈 문자열, 컨테이너는 압축 JSON 문자열이 됩니다.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
