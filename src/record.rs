//! 레코드 모델 모듈
//!
//! 형식에 독립적인 레코드 표현과 필드 경로 규칙(`parent.child`, `field[0]`)을 정의합니다.

use serde_json::{Map, Value};

/// 필드 경로의 한 구간
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// 객체 키
    Key(String),
    /// 배열 인덱스
    Index(usize),
}

/// 하위 객체 키 경로 생성 (`parent.child`)
pub fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// 배열 원소 경로 생성 (`field[0]`)
pub fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

/// 필드 경로를 구간 목록으로 분해
///
/// 대괄호 안이 숫자가 아니면 키의 일부로 취급합니다.
///
/// # Examples
/// ```
/// use tabmerge::record::{parse_path, PathSegment};
///
/// assert_eq!(
///     parse_path("items[0].sku"),
///     vec![
///         PathSegment::Key("items".to_string()),
///         PathSegment::Index(0),
///         PathSegment::Key("sku".to_string()),
///     ]
/// );
/// ```
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut key = String::new();
    let mut chars = path.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '.' => {
                if !key.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut key)));
                }
            }
            '[' => {
                let rest = &path[pos + 1..];
                let index = rest
                    .find(']')
                    .map(|end| &rest[..end])
                    .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                    .and_then(|digits| digits.parse::<usize>().ok().map(|i| (i, digits.len())));

                match index {
                    Some((index, len)) => {
                        if !key.is_empty() {
                            segments.push(PathSegment::Key(std::mem::take(&mut key)));
                        }
                        segments.push(PathSegment::Index(index));
                        // 숫자와 닫는 괄호 건너뛰기
                        for _ in 0..=len {
                            chars.next();
                        }
                    }
                    None => key.push(c),
                }
            }
            _ => key.push(c),
        }
    }

    if !key.is_empty() {
        segments.push(PathSegment::Key(key));
    }

    segments
}

/// 한 건의 데이터 레코드
///
/// JSON 계열 입력은 중첩 구조를 그대로 보존하고, CSV 입력은 헤더 이름을 키로 하는
/// 평면 레코드가 됩니다. 읽은 뒤에는 변경하지 않습니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
    flat: bool,
}

impl Record {
    /// 중첩 구조를 가진 레코드 (JSON, JSONL)
    pub fn nested(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            flat: false,
        }
    }

    /// 평면 레코드 (CSV): 키가 곧 컬럼 이름
    pub fn flat(fields: Map<String, Value>) -> Self {
        Self { fields, flat: true }
    }

    pub fn is_flat(&self) -> bool {
        self.flat
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 경로 위치의 값 조회
    ///
    /// 평면 레코드는 `name`을 그대로 키로 찾고, 중첩 레코드는 구간을 따라 내려갑니다.
    pub fn value_at(&self, name: &str, segments: &[PathSegment]) -> Option<&Value> {
        if self.flat {
            return self.fields.get(name);
        }

        let (first, rest) = segments.split_first()?;
        let mut current = match first {
            PathSegment::Key(key) => self.fields.get(key)?,
            PathSegment::Index(_) => return None,
        };

        for segment in rest {
            current = match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
                (PathSegment::Index(i), Value::Array(arr)) => arr.get(*i)?,
                _ => return None,
            };
        }

        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nested(value: Value) -> Record {
        match value {
            Value::Object(map) => Record::nested(map),
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn test_path_composition() {
        assert_eq!(child_path("", "id"), "id");
        assert_eq!(child_path("address", "city"), "address.city");
        assert_eq!(index_path("tags", 2), "tags[2]");
        assert_eq!(child_path(&index_path("items", 0), "sku"), "items[0].sku");
    }

    #[test]
    fn test_parse_path_keeps_non_numeric_brackets() {
        assert_eq!(
            parse_path("weird[x].y"),
            vec![
                PathSegment::Key("weird[x]".to_string()),
                PathSegment::Key("y".to_string()),
            ]
        );
        assert_eq!(
            parse_path("m[1][2]"),
            vec![
                PathSegment::Key("m".to_string()),
                PathSegment::Index(1),
                PathSegment::Index(2),
            ]
        );
    }

    #[test]
    fn test_value_at_nested() {
        let record = nested(json!({
            "address": {"city": "Seoul"},
            "items": [{"sku": "A1"}, {"sku": "B2"}]
        }));

        let path = "items[1].sku";
        assert_eq!(
            record.value_at(path, &parse_path(path)),
            Some(&json!("B2"))
        );
        let path = "address.city";
        assert_eq!(
            record.value_at(path, &parse_path(path)),
            Some(&json!("Seoul"))
        );
        let path = "address.zip";
        assert_eq!(record.value_at(path, &parse_path(path)), None);
    }

    #[test]
    fn test_value_at_flat_uses_whole_name() {
        let mut map = Map::new();
        map.insert("address.city".to_string(), json!("Busan"));
        let record = Record::flat(map);

        let path = "address.city";
        assert_eq!(
            record.value_at(path, &parse_path(path)),
            Some(&json!("Busan"))
        );
    }
}
