//! 작업 실행 모듈
//!
//! 변환(convert), 분할(split), 병합(merge) 작업을 검증한 뒤
//! 스키마 스캔 → 조정 → 스트리밍의 두 단계 읽기로 실행합니다.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use crate::error::{Result, TabMergeError};
use crate::flatten::{ArrayMode, Flattener};
use crate::format::Format;
use crate::reader::{RecordReader, DEFAULT_MMAP_THRESHOLD};
use crate::reconcile::{reconcile, MergePolicy, Reconciliation};
use crate::schema::{infer_schema_with, SourceSchema};
use crate::stats::{JobCounters, JobSummary};
use crate::writer::{OutputFile, OutputTarget, RecordSink, SinkOptions, SplitPlan};

/// 진행 보고 기본 간격 (레코드 수)
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1000;

/// 작업 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Keep Separate면 입력마다 출력 파일 하나, 그 외에는 조정된 스키마의 병합 파일 하나
    Convert,
    /// 입력 하나를 여러 파일로
    Split(SplitPlan),
    /// 여러 입력을 출력 파일 하나로
    Merge,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Convert => write!(f, "convert"),
            Operation::Split(plan) => write!(f, "split ({})", plan),
            Operation::Merge => write!(f, "merge"),
        }
    }
}

/// 실행할 작업 하나
///
/// `target`은 convert/split에서는 출력 폴더, merge에서는 출력 파일 경로입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    inputs: Vec<PathBuf>,
    operation: Operation,
    policy: MergePolicy,
    format: Format,
    target: PathBuf,
}

impl Job {
    pub fn convert(
        inputs: Vec<PathBuf>,
        policy: MergePolicy,
        format: Format,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inputs,
            operation: Operation::Convert,
            policy,
            format,
            target: output_dir.into(),
        }
    }

    pub fn split(
        input: impl Into<PathBuf>,
        plan: SplitPlan,
        format: Format,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inputs: vec![input.into()],
            operation: Operation::Split(plan),
            policy: MergePolicy::FirstFileSchema,
            format,
            target: output_dir.into(),
        }
    }

    pub fn merge(
        inputs: Vec<PathBuf>,
        policy: MergePolicy,
        format: Format,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inputs,
            operation: Operation::Merge,
            policy,
            format,
            target: output_path.into(),
        }
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// convert에서 입력 하나가 쓰일 출력 경로: `<출력 폴더>/<입력 이름>.<확장자>`
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        self.target
            .join(format!("{}.{}", file_stem(input), self.format.extension()))
    }

    /// 여러 입력을 하나로 변환할 때의 출력 경로: `<출력 폴더>/merged_<정책>.<확장자>`
    pub fn merged_output_path(&self) -> PathBuf {
        self.target.join(format!(
            "merged_{}.{}",
            self.policy.file_label(),
            self.format.extension()
        ))
    }

    /// convert가 입력마다 따로 출력하는지 (Keep Separate이거나 입력이 하나)
    fn converts_each(&self) -> bool {
        self.policy == MergePolicy::KeepSeparate || self.inputs.len() == 1
    }

    /// 실행 전에 경로를 확정할 수 있는 출력 파일들 (split은 개수가 정해지지 않음)
    fn planned_outputs(&self) -> Vec<PathBuf> {
        match self.operation {
            Operation::Convert if self.converts_each() => self
                .inputs
                .iter()
                .map(|input| self.output_path_for(input))
                .collect(),
            Operation::Convert => vec![self.merged_output_path()],
            Operation::Merge => vec![self.target.clone()],
            Operation::Split(_) => Vec::new(),
        }
    }
}

/// 실행 옵션 구조체
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// 배열 평탄화 방식
    pub array_mode: ArrayMode,
    /// JSON 들여쓰기 출력
    pub pretty: bool,
    /// 진행 보고 및 취소 확인 간격 (레코드 수)
    pub progress_interval: u64,
    /// 실패/취소 시 완성된 출력 파일 유지
    pub keep_partial: bool,
    /// 기존 출력 파일 덮어쓰기
    pub overwrite: bool,
    /// Keep Separate 병렬 처리 스레드 수 (None이면 CPU 코어 수)
    pub threads: Option<usize>,
    /// 이 크기 이상의 입력은 메모리 맵으로 읽음
    pub mmap_threshold: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            array_mode: ArrayMode::default(),
            pretty: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            keep_partial: false,
            overwrite: true,
            threads: None,
            mmap_threshold: DEFAULT_MMAP_THRESHOLD,
        }
    }
}

impl EngineOptions {
    /// 새 실행 옵션 생성
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_array_mode(mut self, array_mode: ArrayMode) -> Self {
        self.array_mode = array_mode;
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// 진행 보고 간격 설정 (최소 1)
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn with_keep_partial(mut self, keep_partial: bool) -> Self {
        self.keep_partial = keep_partial;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_mmap_threshold(mut self, threshold: u64) -> Self {
        self.mmap_threshold = threshold;
        self
    }

    fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            pretty: self.pretty,
            overwrite: self.overwrite,
        }
    }
}

/// 작업 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Idle,
    SchemaScan,
    Reconciled,
    Streaming,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Idle => "Idle",
            JobState::SchemaScan => "SchemaScan",
            JobState::Reconciled => "Reconciled",
            JobState::Streaming => "Streaming",
            JobState::Done => "Done",
            JobState::Failed => "Failed",
            JobState::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// 진행 보고
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 현재 단계에서 처리한 레코드 수
    pub records_processed: u64,
    /// 스키마 스캔 이후 알려진 전체 레코드 수
    pub records_total: Option<u64>,
    /// 처리 중인 입력 파일 인덱스 (0부터)
    pub file_index: usize,
    pub state: JobState,
}

/// 작업 취소 토큰
///
/// 복제본끼리 상태를 공유하며, 진행 보고 사이마다 확인됩니다.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 입력 파일과 감지된 형식
#[derive(Debug, Clone)]
struct Source {
    path: PathBuf,
    format: Format,
}

/// 실행 한 번의 공유 상태
struct RunContext<'a> {
    on_progress: &'a (dyn Fn(Progress) + Sync),
    cancel: &'a CancelToken,
    /// 병렬 작업 중 하나가 실패하면 나머지를 멈춤
    halted: AtomicBool,
    total: OnceLock<u64>,
    counters: JobCounters,
    interval: u64,
}

impl<'a> RunContext<'a> {
    fn enter(&self, state: JobState) {
        debug!(state = %state, "작업 상태 전환");
    }

    fn report(&self, processed: u64, file_index: usize, state: JobState) {
        (self.on_progress)(Progress {
            records_processed: processed,
            records_total: self.total.get().copied(),
            file_index,
            state,
        });
    }

    /// 진행 보고 후 취소 여부 확인
    fn checkpoint(&self, processed: u64, file_index: usize, state: JobState) -> Result<()> {
        self.report(processed, file_index, state);
        if self.cancel.is_cancelled() || self.halted.load(Ordering::SeqCst) {
            return Err(TabMergeError::Cancelled);
        }
        Ok(())
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }
}

/// 작업 실행기
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: EngineOptions,
    cancel: CancelToken,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            cancel: CancelToken::new(),
        }
    }

    /// 외부에서 만든 취소 토큰 사용
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// 작업 실행
    ///
    /// 실패하거나 취소되면 쓰던 파일은 항상 지우고, 완성된 파일은 `keep_partial`이
    /// 아니면 지운 뒤 원래 에러를 돌려줍니다.
    pub fn run<F>(&self, job: &Job, on_progress: F) -> Result<JobSummary>
    where
        F: Fn(Progress) + Sync,
    {
        let ctx = RunContext {
            on_progress: &on_progress,
            cancel: &self.cancel,
            halted: AtomicBool::new(false),
            total: OnceLock::new(),
            counters: JobCounters::new(),
            interval: self.options.progress_interval.max(1),
        };

        info!(
            operation = %job.operation,
            inputs = job.inputs.len(),
            format = %job.format,
            target = %job.target.display(),
            "작업 시작"
        );
        ctx.enter(JobState::Idle);

        match self.execute(job, &ctx) {
            Ok(summary) => {
                ctx.enter(JobState::Done);
                ctx.report(
                    summary.records_read,
                    job.inputs.len().saturating_sub(1),
                    JobState::Done,
                );
                info!(
                    records = summary.records_written,
                    files = summary.output_file_count(),
                    dropped = summary.dropped_fields.len(),
                    "작업 완료"
                );
                Ok(summary)
            }
            Err(e) => {
                let state = match e {
                    TabMergeError::Cancelled => JobState::Cancelled,
                    _ => JobState::Failed,
                };
                ctx.enter(state);
                warn!(kind = %e.kind(), error = %e, "작업 중단");
                Err(e)
            }
        }
    }

    /// 입력들의 스키마와 정책 적용 결과 미리보기 (출력 없음)
    pub fn preview(&self, inputs: &[PathBuf], policy: &MergePolicy) -> Result<SchemaPreview> {
        if inputs.is_empty() {
            return Err(TabMergeError::NoInput);
        }
        policy.validate()?;

        let mut schemas = Vec::with_capacity(inputs.len());
        for input in inputs {
            let format = Format::detect(input)?;
            schemas.push(infer_schema_with(
                input,
                format,
                self.options.mmap_threshold,
                |_| Ok(()),
            )?);
        }

        let sources = schemas
            .iter()
            .map(|schema| SourcePreview {
                path: schema.source().to_path_buf(),
                format: schema.format(),
                records: schema.record_count(),
                fields: schema.field_names(),
                columns: Flattener::for_source(schema, self.options.array_mode).column_names(),
            })
            .collect();

        let preview = match reconcile(&schemas, policy)? {
            Reconciliation::Merged(merged) => {
                let merged = merged.with_array_mode(self.options.array_mode);
                SchemaPreview {
                    policy: policy.to_string(),
                    array_mode: self.options.array_mode,
                    separate: false,
                    sources,
                    fields: merged.field_names(),
                    columns: Flattener::for_schema(&merged).column_names(),
                    dropped_fields: merged.dropped_fields(),
                }
            }
            Reconciliation::Separate(_) => SchemaPreview {
                policy: policy.to_string(),
                array_mode: self.options.array_mode,
                separate: true,
                sources,
                fields: Vec::new(),
                columns: Vec::new(),
                dropped_fields: Vec::new(),
            },
        };
        Ok(preview)
    }

    fn execute(&self, job: &Job, ctx: &RunContext<'_>) -> Result<JobSummary> {
        let sources = self.validate(job)?;
        match job.operation {
            Operation::Split(plan) => self.run_split(job, plan, &sources[0], ctx),
            Operation::Convert | Operation::Merge => self.run_reconciled(job, &sources, ctx),
        }
    }

    /// 입출력 전에 작업 구성 검증
    fn validate(&self, job: &Job) -> Result<Vec<Source>> {
        if job.inputs.is_empty() {
            return Err(TabMergeError::NoInput);
        }

        match job.operation {
            Operation::Split(plan) => {
                if job.inputs.len() != 1 {
                    return Err(TabMergeError::invalid_job(format!(
                        "분할은 입력 파일 하나만 받습니다 (입력 {}개)",
                        job.inputs.len()
                    )));
                }
                plan.validate()?;
            }
            Operation::Merge => {
                if job.policy == MergePolicy::KeepSeparate {
                    return Err(TabMergeError::invalid_job(
                        "병합 작업에는 Keep Separate 정책을 쓸 수 없습니다",
                    ));
                }
                job.policy.validate()?;
            }
            Operation::Convert => job.policy.validate()?,
        }

        for input in &job.inputs {
            if !input.is_file() {
                return Err(TabMergeError::invalid_job(format!(
                    "입력 파일을 찾을 수 없습니다: {}",
                    input.display()
                )));
            }
        }

        let mut seen = HashSet::new();
        for output in job.planned_outputs() {
            if !seen.insert(output.clone()) {
                return Err(TabMergeError::invalid_job(format!(
                    "출력 파일 이름이 겹칩니다: {}",
                    output.display()
                )));
            }
            if job.inputs.iter().any(|input| same_file(input, &output)) {
                return Err(TabMergeError::invalid_job(format!(
                    "출력 파일이 입력 파일과 같습니다: {}",
                    output.display()
                )));
            }
            if !self.options.overwrite && output.exists() {
                return Err(TabMergeError::OutputExists { path: output });
            }
        }

        job.inputs
            .iter()
            .map(|path| {
                Ok(Source {
                    path: path.clone(),
                    format: Format::detect(path)?,
                })
            })
            .collect()
    }

    /// 모든 입력의 스키마 스캔 (첫 번째 읽기)
    fn scan_all(&self, sources: &[Source], ctx: &RunContext<'_>) -> Result<Vec<SourceSchema>> {
        ctx.enter(JobState::SchemaScan);
        let mut scanned = 0u64;
        let mut schemas = Vec::with_capacity(sources.len());

        for (index, source) in sources.iter().enumerate() {
            ctx.checkpoint(scanned, index, JobState::SchemaScan)?;
            let base = scanned;
            let schema = infer_schema_with(
                &source.path,
                source.format,
                self.options.mmap_threshold,
                |count| {
                    if count % ctx.interval == 0 {
                        ctx.checkpoint(base + count, index, JobState::SchemaScan)?;
                    }
                    Ok(())
                },
            )?;
            scanned += schema.record_count();
            schemas.push(schema);
        }

        let _ = ctx.total.set(scanned);
        Ok(schemas)
    }

    fn run_split(
        &self,
        job: &Job,
        plan: SplitPlan,
        source: &Source,
        ctx: &RunContext<'_>,
    ) -> Result<JobSummary> {
        // CSV는 헤더가 곧 스키마이므로 행/크기 분할은 첫 레코드만 보고 스캔을 생략
        let fused = !plan.needs_total() && source.format == Format::Csv;

        let (flattener, total) = if fused {
            debug!(file = %source.path.display(), "스키마 스캔 생략");
            let schema = self.header_schema(source)?;
            ctx.enter(JobState::Reconciled);
            (Flattener::for_source(&schema, self.options.array_mode), None)
        } else {
            let schemas = self.scan_all(std::slice::from_ref(source), ctx)?;
            ctx.enter(JobState::Reconciled);
            let schema = &schemas[0];
            let flattener = Flattener::for_source(schema, self.options.array_mode);
            (flattener, Some(schema.record_count()))
        };
        let columns = flattener.column_names();

        ctx.enter(JobState::Streaming);
        let target = OutputTarget::Numbered {
            dir: job.target.clone(),
            stem: file_stem(&source.path),
        };
        let sink = RecordSink::open(
            target,
            job.format,
            flattener,
            Some(plan),
            total,
            self.options.sink_options(),
        )?;
        let outputs = self.pump(ctx, &[(0, source)], sink)?;

        Ok(ctx.counters.summarize(outputs, columns, Vec::new()))
    }

    /// CSV 첫 레코드 하나로 만든 스키마 (모든 행이 같은 헤더를 공유)
    fn header_schema(&self, source: &Source) -> Result<SourceSchema> {
        let mut schema = SourceSchema::new(&source.path, source.format);
        let mut reader =
            RecordReader::open(&source.path, source.format, self.options.mmap_threshold)?;
        if let Some(record) = reader.next().transpose()? {
            schema.observe_record(&record);
        }
        Ok(schema)
    }

    fn run_reconciled(
        &self,
        job: &Job,
        sources: &[Source],
        ctx: &RunContext<'_>,
    ) -> Result<JobSummary> {
        let schemas = self.scan_all(sources, ctx)?;

        ctx.enter(JobState::Reconciled);
        let merged = match reconcile(&schemas, &job.policy)? {
            Reconciliation::Merged(merged) => merged.with_array_mode(self.options.array_mode),
            Reconciliation::Separate(schemas) => {
                return self.run_separate(job, sources, &schemas, ctx);
            }
        };
        let flattener = Flattener::for_schema(&merged);
        let columns = flattener.column_names();
        let dropped = merged.dropped_fields();
        info!(
            policy = %merged.policy(),
            columns = columns.len(),
            dropped = dropped.len(),
            "스키마 조정 완료"
        );

        ctx.enter(JobState::Streaming);
        let path = match job.operation {
            Operation::Convert if job.converts_each() => job.output_path_for(&sources[0].path),
            Operation::Convert => job.merged_output_path(),
            _ => job.target.clone(),
        };
        let sink = RecordSink::open(
            OutputTarget::File(path),
            job.format,
            flattener,
            None,
            None,
            self.options.sink_options(),
        )?;
        let indexed: Vec<(usize, &Source)> = sources.iter().enumerate().collect();
        let outputs = self.pump(ctx, &indexed, sink)?;

        Ok(ctx.counters.summarize(outputs, columns, dropped))
    }

    /// Keep Separate: 입력마다 독립된 읽기→평탄화→쓰기 파이프라인을 병렬 실행
    fn run_separate(
        &self,
        job: &Job,
        sources: &[Source],
        schemas: &[SourceSchema],
        ctx: &RunContext<'_>,
    ) -> Result<JobSummary> {
        ctx.enter(JobState::Streaming);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.threads.unwrap_or(0))
            .build()
            .map_err(|e| TabMergeError::invalid_job(format!("스레드 풀 초기화 실패: {}", e)))?;

        let results: Vec<Result<Vec<OutputFile>>> = pool.install(|| {
            sources
                .par_iter()
                .zip(schemas.par_iter())
                .enumerate()
                .map(|(index, (source, schema))| {
                    let flattener = Flattener::for_source(schema, self.options.array_mode);
                    let result = RecordSink::open(
                        OutputTarget::File(job.output_path_for(&source.path)),
                        job.format,
                        flattener,
                        None,
                        None,
                        self.options.sink_options(),
                    )
                    .and_then(|sink| self.pump(ctx, &[(index, source)], sink));
                    if result.is_err() {
                        ctx.halt();
                    }
                    result
                })
                .collect()
        });

        let mut outputs = Vec::new();
        let mut failure: Option<TabMergeError> = None;
        for result in results {
            match result {
                Ok(files) => outputs.extend(files),
                // 다른 워커를 멈추려고 생긴 취소보다 원래 에러를 우선
                Err(e) => match failure {
                    None => failure = Some(e),
                    Some(TabMergeError::Cancelled) if !matches!(e, TabMergeError::Cancelled) => {
                        failure = Some(e)
                    }
                    Some(_) => {}
                },
            }
        }

        if let Some(e) = failure {
            self.discard(&outputs);
            return Err(e);
        }
        Ok(ctx.counters.summarize(outputs, Vec::new(), Vec::new()))
    }

    /// 입력들을 순서대로 읽어 출력기 하나에 씀 (두 번째 읽기)
    fn pump(
        &self,
        ctx: &RunContext<'_>,
        sources: &[(usize, &Source)],
        mut sink: RecordSink,
    ) -> Result<Vec<OutputFile>> {
        let mut result = Ok(());
        for &(index, source) in sources {
            result = self.stream_file(ctx, index, source, &mut sink);
            if result.is_err() {
                break;
            }
        }
        let result = result.and_then(|_| sink.finish());

        match result {
            Ok(()) => Ok(sink.into_outputs()),
            Err(e) => {
                sink.abort();
                self.discard(sink.outputs());
                Err(e)
            }
        }
    }

    fn stream_file(
        &self,
        ctx: &RunContext<'_>,
        index: usize,
        source: &Source,
        sink: &mut RecordSink,
    ) -> Result<()> {
        ctx.checkpoint(ctx.counters.get_read(), index, JobState::Streaming)?;
        let reader = RecordReader::open(&source.path, source.format, self.options.mmap_threshold)?;

        for record in reader {
            let record = record?;
            let read = ctx.counters.add_read(1);
            sink.write(&record)?;
            ctx.counters.add_written(1);
            if read % ctx.interval == 0 {
                ctx.checkpoint(read, index, JobState::Streaming)?;
            }
        }

        ctx.counters.finish_file();
        debug!(file = %source.path.display(), "입력 파일 스트리밍 완료");
        Ok(())
    }

    /// 실패한 작업의 완성된 출력 파일 정리
    fn discard(&self, outputs: &[OutputFile]) {
        if self.options.keep_partial {
            if !outputs.is_empty() {
                info!(files = outputs.len(), "완성된 출력 파일 유지");
            }
            return;
        }
        for output in outputs {
            match fs::remove_file(&output.path) {
                Ok(()) => warn!(file = %output.path.display(), "완성된 출력 파일 삭제"),
                Err(e) => warn!(
                    file = %output.path.display(),
                    error = %e,
                    "출력 파일 삭제 실패"
                ),
            }
        }
    }
}

/// 입력 파일 하나의 미리보기
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePreview {
    pub path: PathBuf,
    pub format: Format,
    pub records: u64,
    pub fields: Vec<String>,
    pub columns: Vec<String>,
}

/// 스키마 미리보기
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaPreview {
    pub policy: String,
    pub array_mode: ArrayMode,
    /// Keep Separate 여부 (이 경우 공통 필드/컬럼은 비어 있음)
    pub separate: bool,
    pub sources: Vec<SourcePreview>,
    pub fields: Vec<String>,
    pub columns: Vec<String>,
    pub dropped_fields: Vec<String>,
}

/// 변환 (Keep Separate면 입력마다 출력 파일 하나, 그 외에는 병합 파일 하나)
pub fn convert<F>(
    inputs: &[PathBuf],
    policy: MergePolicy,
    format: Format,
    output_dir: &Path,
    on_progress: F,
) -> Result<JobSummary>
where
    F: Fn(Progress) + Sync,
{
    Engine::default().run(
        &Job::convert(inputs.to_vec(), policy, format, output_dir),
        on_progress,
    )
}

/// 입력 하나를 분할 계획에 따라 여러 파일로 분할
pub fn split<F>(
    input: &Path,
    plan: SplitPlan,
    format: Format,
    output_dir: &Path,
    on_progress: F,
) -> Result<JobSummary>
where
    F: Fn(Progress) + Sync,
{
    Engine::default().run(&Job::split(input, plan, format, output_dir), on_progress)
}

/// 여러 입력을 출력 파일 하나로 병합
pub fn merge<F>(
    inputs: &[PathBuf],
    policy: MergePolicy,
    format: Format,
    output_path: &Path,
    on_progress: F,
) -> Result<JobSummary>
where
    F: Fn(Progress) + Sync,
{
    Engine::default().run(
        &Job::merge(inputs.to_vec(), policy, format, output_path),
        on_progress,
    )
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string())
}

/// 두 경로가 같은 기존 파일을 가리키는지
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
