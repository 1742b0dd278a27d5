//! CLI 인자 파싱 모듈
//!
//! clap을 사용한 명령줄 인자 정의 및 파싱을 담당합니다.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::flatten::ArrayMode;
use crate::format::Format;
use crate::job::EngineOptions;
use crate::reconcile::{MergePolicy, DEFAULT_SMART_AUTO_THRESHOLD};
use crate::writer::SplitPlan;

/// 출력 파일 모드
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum WriteMode {
    /// 기존 파일이 있으면 덮어쓰기
    #[default]
    Overwrite,
    /// 기존 파일이 있으면 에러
    Error,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Overwrite => write!(f, "Overwrite"),
            WriteMode::Error => write!(f, "Error"),
        }
    }
}

/// 스키마 병합 정책 선택지
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum PolicyArg {
    /// 임계값 비율 이상의 소스에 있는 필드 (--threshold)
    #[default]
    SmartAuto,
    /// 모든 필드
    UnionAll,
    /// 모든 소스에 공통인 필드
    Intersection,
    /// 필드가 가장 많은 파일의 스키마
    MostComplete,
    /// 파일마다 따로 (convert 전용)
    Separate,
    /// 첫 번째 파일의 스키마
    FirstFile,
}

/// tabmerge CLI 인자 구조체
#[derive(Parser, Debug)]
#[command(
    name = "tabmerge",
    version,
    about = "JSON / JSONL / CSV 변환·분할·병합 도구 (스키마 자동 조정)",
    long_about = r#"
TABMERGE
========

JSON, JSON Lines, CSV 파일을 서로 변환하고, 큰 파일을 나누고,
서로 다른 스키마를 가진 여러 파일을 하나로 합칩니다.

특징:
  • 스키마 스캔 후 스트리밍 변환 (입력 크기와 무관한 메모리 사용)
  • 병합 정책: smart-auto, union-all, intersection, most-complete, separate, first-file
  • 중첩 객체/배열을 CSV 컬럼으로 평탄화하고 다시 복원
  • 파일 개수 / 행 수 / 크기 기준 분할

예제:
  tabmerge convert data/*.jsonl -o out --format csv
  tabmerge split big.jsonl -o parts --rows 10000
  tabmerge merge a.csv b.jsonl -o merged.json --policy union-all
  tabmerge inspect ./data --policy intersection --json
"#
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// 상세 출력 모드 (debug 로그)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 병렬 처리 스레드 수 (기본값: CPU 코어 수)
    #[arg(short = 'j', long, global = true)]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 지정한 형식으로 변환 (separate 정책은 입력마다, 그 외에는 merged_<정책> 파일 하나)
    Convert(ConvertArgs),
    /// 파일 하나를 여러 파일로 분할
    Split(SplitArgs),
    /// 여러 파일을 하나로 병합
    Merge(MergeArgs),
    /// 스키마와 정책 적용 결과 미리보기
    Inspect(InspectArgs),
}

/// 입력 선택 인자
#[derive(Args, Debug)]
pub struct InputArgs {
    /// 입력 파일 또는 폴더 (폴더는 재귀 탐색)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// 폴더 탐색 시 파일 이름 패턴 필터 (glob 형식, 예: "sales_*")
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// 최대 폴더 탐색 깊이
    #[arg(long)]
    pub max_depth: Option<usize>,
}

/// 병합 정책 인자
#[derive(Args, Debug)]
pub struct PolicyArgs {
    /// 스키마 병합 정책
    #[arg(long, value_enum, default_value_t = PolicyArg::SmartAuto)]
    pub policy: PolicyArg,

    /// smart-auto 임계값 (0 초과 1 이하, 경계값 포함)
    #[arg(long, default_value_t = DEFAULT_SMART_AUTO_THRESHOLD)]
    pub threshold: f64,
}

impl PolicyArgs {
    pub fn merge_policy(&self) -> MergePolicy {
        match self.policy {
            PolicyArg::SmartAuto => MergePolicy::SmartAuto {
                threshold: self.threshold,
            },
            PolicyArg::UnionAll => MergePolicy::UnionAll,
            PolicyArg::Intersection => MergePolicy::IntersectionOnly,
            PolicyArg::MostComplete => MergePolicy::MostCompleteFile,
            PolicyArg::Separate => MergePolicy::KeepSeparate,
            PolicyArg::FirstFile => MergePolicy::FirstFileSchema,
        }
    }
}

/// 출력 인자
#[derive(Args, Debug)]
pub struct OutputArgs {
    /// 출력 형식 (merge는 생략 시 출력 파일 확장자로 판단)
    #[arg(short, long, value_enum)]
    pub format: Option<Format>,

    /// 배열 평탄화 방식
    #[arg(long, value_enum, default_value_t = ArrayMode::Indexed)]
    pub arrays: ArrayMode,

    /// JSON 들여쓰기 출력
    #[arg(long)]
    pub pretty: bool,

    /// 출력 파일 모드
    #[arg(short, long, value_enum, default_value_t = WriteMode::Overwrite)]
    pub mode: WriteMode,

    /// 실패/취소 시에도 완성된 출력 파일 유지
    #[arg(long)]
    pub keep_partial: bool,
}

impl OutputArgs {
    /// 출력 형식 결정 (명시값 → 경로 확장자)
    pub fn output_format(&self, path_hint: Option<&Path>) -> Option<Format> {
        self.format.or_else(|| {
            path_hint
                .and_then(|p| p.extension())
                .and_then(|s| s.to_str())
                .and_then(Format::from_extension)
        })
    }

    /// 실행 옵션 생성
    pub fn engine_options(&self, threads: Option<usize>) -> EngineOptions {
        EngineOptions::new()
            .with_array_mode(self.arrays)
            .with_pretty(self.pretty)
            .with_overwrite(self.mode == WriteMode::Overwrite)
            .with_keep_partial(self.keep_partial)
            .with_threads(threads)
    }
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// 출력 폴더
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub policy: PolicyArgs,

    #[command(flatten)]
    pub out: OutputArgs,
}

/// 분할 기준 (하나만 지정)
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct SplitPlanArgs {
    /// 정확히 N개 파일로 고르게 분할
    #[arg(long)]
    pub files: Option<usize>,

    /// 파일당 N건
    #[arg(long)]
    pub rows: Option<usize>,

    /// 파일당 약 N KB
    #[arg(long)]
    pub size_kb: Option<u64>,
}

impl SplitPlanArgs {
    pub fn plan(&self) -> Option<SplitPlan> {
        self.files
            .map(SplitPlan::ByFileCount)
            .or(self.rows.map(SplitPlan::ByRowsPerFile))
            .or(self.size_kb.map(SplitPlan::ByApproxSizeKB))
    }
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// 분할할 입력 파일
    pub input: PathBuf,

    /// 출력 폴더
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub plan: SplitPlanArgs,

    #[command(flatten)]
    pub out: OutputArgs,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// 출력 파일 경로
    #[arg(short, long)]
    pub output: PathBuf,

    #[command(flatten)]
    pub policy: PolicyArgs,

    #[command(flatten)]
    pub out: OutputArgs,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub policy: PolicyArgs,

    /// 배열 평탄화 방식
    #[arg(long, value_enum, default_value_t = ArrayMode::Indexed)]
    pub arrays: ArrayMode,

    /// 결과를 JSON으로 출력
    #[arg(long)]
    pub json: bool,
}
