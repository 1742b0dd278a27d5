//! 패턴 매칭 모듈
//!
//! glob 패턴을 사용한 파일 이름 필터링과 폴더 입력 탐색을 담당합니다.

use glob::Pattern;
use std::path::PathBuf;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, TabMergeError};
use crate::format::Format;

/// 컴파일된 패턴 매처
#[derive(Debug, Default)]
pub struct PatternMatcher {
    pattern: Option<Pattern>,
}

impl PatternMatcher {
    /// 새 패턴 매처 생성
    ///
    /// # Arguments
    /// * `pattern` - 글로브 패턴 문자열 (None이면 모든 파일 매칭)
    ///
    /// # Examples
    /// ```
    /// use tabmerge::pattern::PatternMatcher;
    ///
    /// let matcher = PatternMatcher::new(Some("sales_*".to_string())).unwrap();
    /// assert!(matcher.matches("sales_2024.csv"));
    /// assert!(!matcher.matches("users.jsonl"));
    /// ```
    pub fn new(pattern: Option<String>) -> Result<Self> {
        let compiled = match pattern {
            Some(ref p) => Some(
                Pattern::new(p)
                    .map_err(|_| TabMergeError::InvalidPattern { pattern: p.clone() })?,
            ),
            None => None,
        };

        Ok(Self { pattern: compiled })
    }

    /// 파일 이름이 패턴과 일치하는지 확인 (패턴이 없으면 항상 true)
    pub fn matches(&self, file_name: &str) -> bool {
        match &self.pattern {
            Some(p) => p.matches(file_name),
            None => true,
        }
    }

    pub fn has_pattern(&self) -> bool {
        self.pattern.is_some()
    }
}

/// 입력 경로 목록 확장
///
/// 폴더는 재귀적으로 탐색하여 지원 형식(json, jsonl, ndjson, csv) 중 패턴과 일치하는
/// 파일을 경로순으로 추가합니다. 파일 경로는 그대로 유지됩니다.
/// 심볼릭 링크는 따라가며, 깨진 링크나 읽을 수 없는 항목은 I/O 에러입니다.
pub fn collect_inputs(
    paths: &[PathBuf],
    matcher: &PatternMatcher,
    max_depth: Option<usize>,
) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();

    for path in paths {
        if !path.is_dir() {
            inputs.push(path.clone());
            continue;
        }

        let walker = match max_depth {
            Some(depth) => WalkDir::new(path).max_depth(depth),
            None => WalkDir::new(path),
        };

        let entries = walker
            .follow_links(true)
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TabMergeError::Io {
                file: e.path().unwrap_or(path.as_path()).to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut found: Vec<PathBuf> = entries
            .into_iter()
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|s| s.to_str())
                    .and_then(Format::from_extension)
                    .is_some()
            })
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|s| s.to_str())
                    .map(|s| matcher.matches(s))
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        found.sort();

        debug!(dir = %path.display(), files = found.len(), "폴더 입력 확장");
        inputs.extend(found);
    }

    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_pattern_matcher_with_wildcard() {
        let matcher = PatternMatcher::new(Some("*_SUM_*".to_string())).unwrap();
        assert!(matcher.matches("test_SUM_1.json"));
        assert!(!matcher.matches("test.json"));
    }

    #[test]
    fn test_pattern_matcher_with_brackets() {
        let matcher = PatternMatcher::new(Some("file[0-9].csv".to_string())).unwrap();
        assert!(matcher.matches("file1.csv"));
        assert!(!matcher.matches("fileA.csv"));
    }

    #[test]
    fn test_pattern_matcher_none_and_invalid() {
        let matcher = PatternMatcher::new(None).unwrap();
        assert!(matcher.matches("anything.jsonl"));
        assert!(!matcher.has_pattern());

        let result = PatternMatcher::new(Some("[invalid".to_string()));
        assert!(matches!(result, Err(TabMergeError::InvalidPattern { .. })));
    }

    #[test]
    fn test_collect_inputs_sorted_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b.jsonl"), "{}\n").unwrap();
        fs::write(temp_dir.path().join("a.csv"), "id\n1\n").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "skip").unwrap();
        fs::write(temp_dir.path().join("c.NDJSON"), "{}\n").unwrap();

        let explicit = PathBuf::from("explicit.json");
        let inputs = collect_inputs(
            &[temp_dir.path().to_path_buf(), explicit.clone()],
            &PatternMatcher::default(),
            None,
        )
        .unwrap();

        assert_eq!(
            inputs,
            vec![
                temp_dir.path().join("a.csv"),
                temp_dir.path().join("b.jsonl"),
                temp_dir.path().join("c.NDJSON"),
                explicit,
            ]
        );
    }

    #[test]
    fn test_collect_inputs_pattern_and_depth() {
        let temp_dir = TempDir::new().unwrap();
        let sub_dir = temp_dir.path().join("sub");
        fs::create_dir(&sub_dir).unwrap();
        fs::write(temp_dir.path().join("sales_1.json"), "[]").unwrap();
        fs::write(temp_dir.path().join("users.json"), "[]").unwrap();
        fs::write(sub_dir.join("sales_2.json"), "[]").unwrap();

        let matcher = PatternMatcher::new(Some("sales_*".to_string())).unwrap();
        let all = collect_inputs(&[temp_dir.path().to_path_buf()], &matcher, None).unwrap();
        assert_eq!(all.len(), 2);

        let shallow =
            collect_inputs(&[temp_dir.path().to_path_buf()], &matcher, Some(1)).unwrap();
        assert_eq!(shallow, vec![temp_dir.path().join("sales_1.json")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_inputs_reports_broken_link() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.json"), "[]").unwrap();
        let link = temp_dir.path().join("gone.json");
        std::os::unix::fs::symlink(temp_dir.path().join("missing.json"), &link).unwrap();

        let err = collect_inputs(
            &[temp_dir.path().to_path_buf()],
            &PatternMatcher::default(),
            None,
        )
        .unwrap_err();

        assert!(matches!(err, TabMergeError::Io { ref file, .. } if *file == link));
    }
}
