//! tabmerge - JSON / JSONL / CSV 변환·분할·병합 엔진
//!
//! 서로 다른 스키마를 가진 레코드 파일들을 정책에 따라 조정하고, 스트리밍으로
//! 변환·분할·병합합니다.
//!
//! # 주요 기능
//!
//! - 🔍 **스키마 추론**: 파일 전체를 메모리에 올리지 않고 필드 경로와 출현 횟수를 수집
//! - 🧩 **스키마 조정**: Smart Auto, Union All, Intersection, Most Complete, Keep Separate, First File
//! - 🧱 **평탄화**: 중첩 객체/배열을 CSV 컬럼으로 펼치고, CSV에서 다시 중첩 JSON으로 복원
//! - ✂️ **분할**: 파일 개수 / 행 수 / 대략적인 크기 기준
//! - 🚀 **병렬 처리**: Keep Separate 변환은 Rayon 워커 풀에서 파일별로 실행
//! - ⛔ **취소 및 정리**: 실패나 취소 시 쓰다 만 출력 파일 삭제
//!
//! # 예제
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use tabmerge::{merge, Format, MergePolicy};
//!
//! let inputs = vec![PathBuf::from("a.csv"), PathBuf::from("b.jsonl")];
//! let summary = merge(
//!     &inputs,
//!     MergePolicy::UnionAll,
//!     Format::Json,
//!     Path::new("merged.json"),
//!     |_progress| {},
//! )?;
//! println!("{}건 병합", summary.records_written);
//! # Ok::<(), tabmerge::TabMergeError>(())
//! ```

pub mod cli;
pub mod error;
pub mod flatten;
pub mod format;
pub mod job;
pub mod pattern;
pub mod reader;
pub mod reconcile;
pub mod record;
pub mod schema;
pub mod stats;
pub mod writer;

// Re-exports for convenient access
pub use error::{ErrorKind, Location, Result, TabMergeError};
pub use flatten::{ArrayMode, Flattener};
pub use format::Format;
pub use job::{
    convert, merge, split, CancelToken, Engine, EngineOptions, Job, JobState, Operation,
    Progress, SchemaPreview,
};
pub use pattern::{collect_inputs, PatternMatcher};
pub use reconcile::{reconcile, MergePolicy, MergedSchema, Reconciliation};
pub use record::Record;
pub use schema::{infer_schema, SourceSchema};
pub use stats::{format_bytes, JobSummary};
pub use writer::{OutputFile, SplitPlan};
