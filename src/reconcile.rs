//! 스키마 조정 모듈
//!
//! 여러 소스 스키마를 병합 정책에 따라 하나의 출력 필드 목록으로 합칩니다.
//! 결과 순서는 입력 순서와 각 소스 안의 최초 출현 순서로만 결정됩니다.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TabMergeError};
use crate::flatten::ArrayMode;
use crate::schema::{FieldInfo, SourceSchema};

/// Smart Auto 기본 임계값 (소스의 70% 이상)
pub const DEFAULT_SMART_AUTO_THRESHOLD: f64 = 0.70;

/// 부동소수 곱셈 오차 허용치 (0.7 * 10 = 7.000000000000001)
const THRESHOLD_EPSILON: f64 = 1e-9;

/// 필드 병합 정책
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergePolicy {
    /// 전체 소스 중 `threshold` 비율 이상에 있는 필드 (경계값 포함)
    SmartAuto { threshold: f64 },
    /// 모든 필드의 합집합
    UnionAll,
    /// 모든 소스에 있는 필드만
    IntersectionOnly,
    /// 필드가 가장 많은 소스의 스키마
    MostCompleteFile,
    /// 조정하지 않고 소스마다 따로 출력
    KeepSeparate,
    /// 첫 번째 소스의 스키마
    FirstFileSchema,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy::smart_auto()
    }
}

impl MergePolicy {
    pub fn smart_auto() -> Self {
        MergePolicy::SmartAuto {
            threshold: DEFAULT_SMART_AUTO_THRESHOLD,
        }
    }

    /// 출력 파일 이름에 쓰는 정책 이름 (`merged_union_all.csv`)
    pub fn file_label(&self) -> &'static str {
        match self {
            MergePolicy::SmartAuto { .. } => "smart_auto",
            MergePolicy::UnionAll => "union_all",
            MergePolicy::IntersectionOnly => "intersection_only",
            MergePolicy::MostCompleteFile => "most_complete",
            MergePolicy::KeepSeparate => "separate",
            MergePolicy::FirstFileSchema => "first_file",
        }
    }

    /// 정책 값 검증
    pub fn validate(&self) -> Result<()> {
        if let MergePolicy::SmartAuto { threshold } = self {
            if !(threshold.is_finite() && *threshold > 0.0 && *threshold <= 1.0) {
                return Err(TabMergeError::invalid_job(format!(
                    "Smart Auto 임계값은 0보다 크고 1 이하여야 합니다: {}",
                    threshold
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergePolicy::SmartAuto { threshold } => {
                write!(f, "Smart Auto ({:.0}%)", threshold * 100.0)
            }
            MergePolicy::UnionAll => write!(f, "Union All"),
            MergePolicy::IntersectionOnly => write!(f, "Intersection Only"),
            MergePolicy::MostCompleteFile => write!(f, "Most Complete File"),
            MergePolicy::KeepSeparate => write!(f, "Keep Separate"),
            MergePolicy::FirstFileSchema => write!(f, "First File Schema"),
        }
    }
}

/// Smart Auto에서 필드가 살아남기 위해 필요한 최소 소스 수
///
/// `ceil(threshold * total)`, 최소 1.
///
/// # Examples
/// ```
/// use tabmerge::reconcile::min_sources_for;
///
/// assert_eq!(min_sources_for(0.7, 3), 3);
/// assert_eq!(min_sources_for(0.7, 10), 7);
/// ```
pub fn min_sources_for(threshold: f64, total: usize) -> usize {
    let required = (threshold * total as f64 - THRESHOLD_EPSILON).ceil();
    (required.max(1.0)) as usize
}

/// 필드가 유지되거나 제외된 이유
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DecisionReason {
    /// 합집합 정책
    Union,
    /// `sources`개 소스에 존재 (전체 `total`개, 필요 `required`개)
    Coverage {
        sources: usize,
        total: usize,
        required: usize,
    },
    /// 선택된 소스(`index`)의 스키마에 포함
    InSelectedSource { index: usize },
    /// 선택된 소스(`index`)의 스키마에 없음
    NotInSelectedSource { index: usize },
}

/// 필드 하나에 대한 정책 판정
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDecision {
    pub path: String,
    pub kept: bool,
    pub reason: DecisionReason,
}

/// 조정된 출력 스키마
///
/// 만든 뒤에는 바뀌지 않으며 평탄화와 쓰기 단계에서 읽기 전용으로 공유됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedSchema {
    policy: MergePolicy,
    array_mode: ArrayMode,
    source_count: usize,
    fields: Vec<FieldInfo>,
    decisions: Vec<FieldDecision>,
}

impl MergedSchema {
    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// 배열 필드 평탄화 방식
    pub fn array_mode(&self) -> ArrayMode {
        self.array_mode
    }

    /// 배열 평탄화 방식 지정
    pub fn with_array_mode(mut self, mode: ArrayMode) -> Self {
        self.array_mode = mode;
        self
    }

    pub fn source_count(&self) -> usize {
        self.source_count
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
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

    /// 합집합 순서로 나열한 모든 필드의 판정
    pub fn decisions(&self) -> &[FieldDecision] {
        &self.decisions
    }

    /// 정책에 의해 제외된 필드
    pub fn dropped_fields(&self) -> Vec<String> {
        self.decisions
            .iter()
            .filter(|d| !d.kept)
            .map(|d| d.path.clone())
            .collect()
    }
}

/// 조정 결과
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// 모든 소스가 공유하는 하나의 스키마
    Merged(MergedSchema),
    /// Keep Separate: 소스마다 자기 스키마로 따로 출력
    Separate(Vec<SourceSchema>),
}

impl Reconciliation {
    pub fn merged(&self) -> Option<&MergedSchema> {
        match self {
            Reconciliation::Merged(schema) => Some(schema),
            Reconciliation::Separate(_) => None,
        }
    }
}

/// 합집합 순서의 필드별 집계
struct UnionEntry {
    info: FieldInfo,
    sources: usize,
}

fn union_of(schemas: &[SourceSchema]) -> Vec<UnionEntry> {
    let mut entries: Vec<UnionEntry> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for schema in schemas {
        for field in schema.fields().iter().filter(|f| f.occurrences > 0) {
            match index.get(field.path.as_str()) {
                Some(&i) => {
                    let entry = &mut entries[i];
                    entry.info.occurrences += field.occurrences;
                    entry.info.shape.merge(field.shape);
                    entry.sources += 1;
                }
                None => {
                    index.insert(field.path.as_str(), entries.len());
                    entries.push(UnionEntry {
                        info: field.clone(),
                        sources: 1,
                    });
                }
            }
        }
    }

    entries
}

/// 소스 스키마 목록을 정책에 따라 조정
pub fn reconcile(schemas: &[SourceSchema], policy: &MergePolicy) -> Result<Reconciliation> {
    if schemas.is_empty() {
        return Err(TabMergeError::NoInput);
    }
    policy.validate()?;

    if *policy == MergePolicy::KeepSeparate {
        return Ok(Reconciliation::Separate(schemas.to_vec()));
    }

    let total = schemas.len();
    let union = union_of(schemas);
    let mut decisions = Vec::with_capacity(union.len());

    let fields = match policy {
        MergePolicy::UnionAll => {
            for entry in &union {
                decisions.push(FieldDecision {
                    path: entry.info.path.clone(),
                    kept: true,
                    reason: DecisionReason::Union,
                });
            }
            union.into_iter().map(|e| e.info).collect()
        }
        MergePolicy::SmartAuto { threshold } => {
            let required = min_sources_for(*threshold, total);
            coverage_filter(union, total, required, &mut decisions)
        }
        MergePolicy::IntersectionOnly => {
            let kept = coverage_filter(union, total, total, &mut decisions);
            // 첫 번째 소스의 순서를 따름
            let first = &schemas[0];
            let mut ordered: Vec<FieldInfo> = Vec::with_capacity(kept.len());
            let by_path: HashMap<&str, &FieldInfo> =
                kept.iter().map(|f| (f.path.as_str(), f)).collect();
            for field in first.fields() {
                if let Some(info) = by_path.get(field.path.as_str()) {
                    ordered.push((*info).clone());
                }
            }
            ordered
        }
        MergePolicy::MostCompleteFile => {
            // 동률이면 앞선 소스
            let mut selected = 0;
            for (i, schema) in schemas.iter().enumerate() {
                if schema.len() > schemas[selected].len() {
                    selected = i;
                }
            }
            select_source(schemas, selected, &union, &mut decisions)
        }
        MergePolicy::FirstFileSchema => select_source(schemas, 0, &union, &mut decisions),
        MergePolicy::KeepSeparate => unreachable!("handled above"),
    };

    Ok(Reconciliation::Merged(MergedSchema {
        policy: *policy,
        array_mode: ArrayMode::default(),
        source_count: total,
        fields,
        decisions,
    }))
}

fn coverage_filter(
    union: Vec<UnionEntry>,
    total: usize,
    required: usize,
    decisions: &mut Vec<FieldDecision>,
) -> Vec<FieldInfo> {
    let mut kept = Vec::new();
    for entry in union {
        let keep = entry.sources >= required;
        decisions.push(FieldDecision {
            path: entry.info.path.clone(),
            kept: keep,
            reason: DecisionReason::Coverage {
                sources: entry.sources,
                total,
                required,
            },
        });
        if keep {
            kept.push(entry.info);
        }
    }
    kept
}

fn select_source(
    schemas: &[SourceSchema],
    selected: usize,
    union: &[UnionEntry],
    decisions: &mut Vec<FieldDecision>,
) -> Vec<FieldInfo> {
    let schema = &schemas[selected];
    for entry in union {
        let kept = schema.contains(&entry.info.path);
        let reason = if kept {
            DecisionReason::InSelectedSource { index: selected }
        } else {
            DecisionReason::NotInSelectedSource { index: selected }
        };
        decisions.push(FieldDecision {
            path: entry.info.path.clone(),
            kept,
            reason,
        });
    }
    schema
        .fields()
        .iter()
        .filter(|f| f.occurrences > 0)
        .cloned()
        .collect()
}
