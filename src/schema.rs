//! 소스 스키마 추론 모듈
//!
//! 입력 파일 하나를 처음부터 끝까지 한 번 훑으며 필드 경로, 출현 횟수, 형태를 기록합니다.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::format::Format;
use crate::reader::{RecordReader, DEFAULT_MMAP_THRESHOLD};
use crate::record::{child_path, index_path, parse_path, PathSegment, Record};

/// 필드의 대표 형태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Scalar,
    Object,
    Array,
}

/// 한 필드 경로에서 관찰된 값의 형태들
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldShape {
    /// null이 아닌 스칼라 값
    pub scalar: bool,
    pub null: bool,
    pub object: bool,
    pub array: bool,
    /// CSV 헤더처럼 평면 레코드의 컬럼 이름으로 관찰됨
    pub flat: bool,
}

impl FieldShape {
    fn of(value: &Value) -> Self {
        let mut shape = Self::default();
        match value {
            Value::Null => shape.null = true,
            Value::Object(_) => shape.object = true,
            Value::Array(_) => shape.array = true,
            _ => shape.scalar = true,
        }
        shape
    }

    pub fn merge(&mut self, other: FieldShape) {
        self.scalar |= other.scalar;
        self.null |= other.null;
        self.object |= other.object;
        self.array |= other.array;
        self.flat |= other.flat;
    }

    /// 대표 형태: 배열 > 객체 > 스칼라
    pub fn kind(&self) -> FieldKind {
        if self.array {
            FieldKind::Array
        } else if self.object {
            FieldKind::Object
        } else {
            FieldKind::Scalar
        }
    }

    /// 평면 컬럼 하나로 표현되어야 하는 필드인지
    ///
    /// 스칼라가 한 번이라도 나왔거나, null만 나온 경우입니다.
    pub fn is_leaf(&self) -> bool {
        self.scalar || !(self.object || self.array)
    }
}

/// 필드 경로 하나의 통계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    pub path: String,
    /// 레코드를 실제로 따라 내려간 구간 (키에 `.`이나 `[n]`이 있어도 그대로 보존)
    #[serde(skip)]
    pub segments: Vec<PathSegment>,
    /// 이 경로가 나타난 레코드 수
    pub occurrences: u64,
    pub shape: FieldShape,
}

impl FieldInfo {
    pub fn kind(&self) -> FieldKind {
        self.shape.kind()
    }
}

/// 입력 파일 하나의 스키마
///
/// 필드는 처음 나타난 순서대로 유지됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSchema {
    source: PathBuf,
    format: Format,
    fields: Vec<FieldInfo>,
    index: HashMap<String, usize>,
    record_count: u64,
}

impl SourceSchema {
    pub fn new(source: impl Into<PathBuf>, format: Format) -> Self {
        Self {
            source: source.into(),
            format,
            fields: Vec::new(),
            index: HashMap::new(),
            record_count: 0,
        }
    }

    /// 주어진 스칼라 필드들을 가진 레코드 한 건을 관찰한 것과 같은 스키마
    pub fn from_fields<S: AsRef<str>>(
        source: impl Into<PathBuf>,
        format: Format,
        fields: &[S],
    ) -> Self {
        let mut schema = Self::new(source, format);
        for field in fields {
            let shape = FieldShape {
                scalar: true,
                ..FieldShape::default()
            };
            let path = field.as_ref();
            schema.observe(path, &parse_path(path), shape);
        }
        schema.record_count = u64::from(!fields.is_empty());
        schema
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn field(&self, path: &str) -> Option<&FieldInfo> {
        self.index.get(path).map(|&i| &self.fields[i])
    }

    /// 한 번 이상 나타난 필드인지
    pub fn contains(&self, path: &str) -> bool {
        self.field(path).is_some_and(|f| f.occurrences > 0)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// 레코드 한 건 반영
    ///
    /// 평면 레코드의 컬럼 이름은 중첩 경로 표기로 해석해 두어, JSON으로 복원할 때 다시
    /// 중첩 구조가 됩니다.
    pub fn observe_record(&mut self, record: &Record) {
        self.record_count += 1;
        if record.is_flat() {
            for (name, value) in record.fields() {
                let shape = FieldShape {
                    flat: true,
                    ..FieldShape::of(value)
                };
                self.observe(name, &parse_path(name), shape);
            }
        } else {
            let mut segments = Vec::new();
            self.observe_object("", &mut segments, record.fields());
        }
    }

    fn observe_object(
        &mut self,
        prefix: &str,
        segments: &mut Vec<PathSegment>,
        map: &Map<String, Value>,
    ) {
        for (key, value) in map {
            segments.push(PathSegment::Key(key.clone()));
            self.observe_value(child_path(prefix, key), segments, value);
            segments.pop();
        }
    }

    fn observe_value(&mut self, path: String, segments: &mut Vec<PathSegment>, value: &Value) {
        self.observe(&path, segments, FieldShape::of(value));
        match value {
            Value::Object(map) => self.observe_object(&path, segments, map),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    segments.push(PathSegment::Index(i));
                    self.observe_value(index_path(&path, i), segments, item);
                    segments.pop();
                }
            }
            _ => {}
        }
    }

    /// 같은 이름이 여러 구조에서 나오면 처음 관찰된 구간을 유지
    fn observe(&mut self, path: &str, segments: &[PathSegment], shape: FieldShape) {
        match self.index.get(path) {
            Some(&i) => {
                let info = &mut self.fields[i];
                info.occurrences += 1;
                info.shape.merge(shape);
            }
            None => {
                self.index.insert(path.to_string(), self.fields.len());
                self.fields.push(FieldInfo {
                    path: path.to_string(),
                    segments: segments.to_vec(),
                    occurrences: 1,
                    shape,
                });
            }
        }
    }
}

/// 파일 하나의 스키마 추론 (형식 자동 감지)
pub fn infer_schema(path: &Path) -> Result<SourceSchema> {
    let format = Format::detect(path)?;
    infer_schema_with(path, format, DEFAULT_MMAP_THRESHOLD, |_| Ok(()))
}

/// 스키마 추론
///
/// `on_record`는 레코드마다 누적 건수와 함께 호출되며, 에러를 돌려주면 스캔을 중단합니다.
pub fn infer_schema_with<F>(
    path: &Path,
    format: Format,
    mmap_threshold: u64,
    mut on_record: F,
) -> Result<SourceSchema>
where
    F: FnMut(u64) -> Result<()>,
{
    let mut schema = SourceSchema::new(path, format);
    let reader = RecordReader::open(path, format, mmap_threshold)?;

    for record in reader {
        schema.observe_record(&record?);
        on_record(schema.record_count())?;
    }

    debug!(
        file = %path.display(),
        records = schema.record_count(),
        fields = schema.len(),
        "스키마 스캔 완료"
    );

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => Record::nested(map),
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn test_observe_nested_paths_in_first_seen_order() {
        let mut schema = SourceSchema::new("a.jsonl", Format::Jsonl);
        schema.observe_record(&record(json!({
            "id": 1,
            "address": {"city": "Seoul"},
            "tags": ["x"]
        })));
        schema.observe_record(&record(json!({
            "id": 2,
            "tags": ["x", "y"],
            "name": "b"
        })));

        assert_eq!(
            schema.field_names(),
            vec!["id", "address", "address.city", "tags", "tags[0]", "tags[1]", "name"]
        );
        assert_eq!(schema.field("id").unwrap().occurrences, 2);
        assert_eq!(schema.field("tags[1]").unwrap().occurrences, 1);
        assert_eq!(schema.field("address").unwrap().kind(), FieldKind::Object);
        assert_eq!(schema.field("tags").unwrap().kind(), FieldKind::Array);
        assert_eq!(schema.record_count(), 2);
    }

    #[test]
    fn test_shape_leaf_rules() {
        let mut schema = SourceSchema::new("a.json", Format::Json);
        schema.observe_record(&record(json!({"meta": null, "opt": null})));
        schema.observe_record(&record(json!({"meta": {"k": 1}})));

        let meta = schema.field("meta").unwrap();
        assert!(!meta.shape.is_leaf());
        assert_eq!(meta.kind(), FieldKind::Object);

        let opt = schema.field("opt").unwrap();
        assert!(opt.shape.is_leaf());
    }

    #[test]
    fn test_flat_records_keep_dotted_names() {
        let mut map = Map::new();
        map.insert("address.city".to_string(), json!("Seoul"));
        map.insert("id".to_string(), json!("1"));

        let mut schema = SourceSchema::new("a.csv", Format::Csv);
        schema.observe_record(&Record::flat(map));

        assert_eq!(schema.field_names(), vec!["address.city", "id"]);
        let city = schema.field("address.city").unwrap();
        assert_eq!(city.kind(), FieldKind::Scalar);
        assert!(city.shape.flat);
        assert_eq!(
            city.segments,
            vec![
                PathSegment::Key("address".to_string()),
                PathSegment::Key("city".to_string()),
            ]
        );
    }

    #[test]
    fn test_dotted_key_keeps_real_segments() {
        let mut schema = SourceSchema::new("a.jsonl", Format::Jsonl);
        schema.observe_record(&record(json!({"a.b": "v", "list": [{"k[0]": 1}]})));

        let dotted = schema.field("a.b").unwrap();
        assert_eq!(dotted.segments, vec![PathSegment::Key("a.b".to_string())]);
        assert!(!dotted.shape.flat);

        let inner = schema.field("list[0].k[0]").unwrap();
        assert_eq!(
            inner.segments,
            vec![
                PathSegment::Key("list".to_string()),
                PathSegment::Index(0),
                PathSegment::Key("k[0]".to_string()),
            ]
        );
    }
}
