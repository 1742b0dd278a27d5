//! tabmerge - JSON / JSONL / CSV 변환·분할·병합 도구
//!
//! 메인 엔트리포인트

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use tabmerge::{
    cli::{Cli, Command, InputArgs, InspectArgs, OutputArgs},
    error::TabMergeError,
    job::{Engine, EngineOptions, Job, JobState, Progress, SchemaPreview},
    pattern::{collect_inputs, PatternMatcher},
    stats::JobSummary,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// 로그 초기화 (기본 warn, --verbose면 debug, RUST_LOG 우선)
fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Convert(args) => {
            let inputs = resolve_inputs(&args.input)?;
            let format = require_format(&args.out, None)?;
            let job = Job::convert(inputs, args.policy.merge_policy(), format, &args.output);
            execute(&job, &args.out, cli)
        }
        Command::Split(args) => {
            let plan = args
                .plan
                .plan()
                .context("분할 기준(--files, --rows, --size-kb)이 필요합니다")?;
            let format = require_format(&args.out, Some(&args.input))?;
            let job = Job::split(&args.input, plan, format, &args.output);
            execute(&job, &args.out, cli)
        }
        Command::Merge(args) => {
            let inputs = resolve_inputs(&args.input)?;
            let format = require_format(&args.out, Some(&args.output))?;
            let job = Job::merge(inputs, args.policy.merge_policy(), format, &args.output);
            execute(&job, &args.out, cli)
        }
        Command::Inspect(args) => inspect(args, cli),
    }
}

/// 폴더 입력 확장 및 패턴 적용
fn resolve_inputs(args: &InputArgs) -> Result<Vec<PathBuf>> {
    let matcher = PatternMatcher::new(args.pattern.clone())?;
    Ok(collect_inputs(&args.inputs, &matcher, args.max_depth)?)
}

fn require_format(out: &OutputArgs, hint: Option<&PathBuf>) -> Result<tabmerge::Format> {
    out.output_format(hint.map(|p| p.as_path()))
        .context("출력 형식을 알 수 없습니다 (--format json|jsonl|csv)")
}

/// 작업 실행
fn execute(job: &Job, out: &OutputArgs, cli: &Cli) -> Result<()> {
    print_header(job, out);

    let engine = Engine::new(out.engine_options(cli.threads));
    let pb = create_progress_bar();

    let result = engine.run(job, |progress: Progress| update_progress(&pb, progress));

    match result {
        Ok(summary) => {
            pb.finish_with_message("완료!");
            print_done(&summary, cli.verbose);
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("중단됨");
            Err(e.into())
        }
    }
}

/// 헤더 출력
fn print_header(job: &Job, out: &OutputArgs) {
    println!("\n{}", "═".repeat(50).bright_blue());
    println!(
        "{}",
        format!(" 🚀 TABMERGE - {}", job.operation())
            .bright_white()
            .bold()
    );
    println!("{}", "═".repeat(50).bright_blue());
    println!(
        "  {} 입력 파일: {}",
        "📂".bright_cyan(),
        job.inputs().len()
    );
    println!(
        "  {} 출력: {} ({})",
        "📄".bright_green(),
        job.target().display(),
        job.format()
    );
    println!("  {} 모드: {}", "⚙️".bright_yellow(), out.mode);

    if !matches!(job.operation(), tabmerge::Operation::Split(_)) {
        println!("  {} 병합 정책: {}", "🧩".bright_magenta(), job.policy());
    }

    if out.pretty {
        println!(
            "  {} {}",
            "✨".bright_magenta(),
            "Pretty 출력 모드".magenta()
        );
    }

    println!("{}", "═".repeat(50).bright_blue());
}

/// 진행률 바 생성 (전체 건수는 스키마 스캔 후에 정해짐)
fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░"),
    );
    pb
}

fn update_progress(pb: &ProgressBar, progress: Progress) {
    if let Some(total) = progress.records_total {
        pb.set_length(total);
    }
    pb.set_position(progress.records_processed);

    let message = match progress.state {
        JobState::SchemaScan => format!("스키마 스캔 중 (파일 {})", progress.file_index + 1),
        JobState::Streaming => format!("쓰는 중 (파일 {})", progress.file_index + 1),
        state => state.to_string(),
    };
    pb.set_message(message);
}

fn print_done(summary: &JobSummary, verbose: bool) {
    summary.print_summary(verbose);
    println!(
        "\n{} 저장 완료: 출력 파일 {}개\n",
        "✅".bright_green(),
        summary.output_file_count().to_string().bright_green()
    );
}

/// 스키마 미리보기
fn inspect(args: &InspectArgs, cli: &Cli) -> Result<()> {
    let inputs = resolve_inputs(&args.input)?;
    let engine = Engine::new(
        EngineOptions::new()
            .with_array_mode(args.arrays)
            .with_threads(cli.threads),
    );
    let preview = engine.preview(&inputs, &args.policy.merge_policy())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        print_preview(&preview);
    }
    Ok(())
}

fn print_preview(preview: &SchemaPreview) {
    println!("\n{}", "═".repeat(50).bright_blue());
    println!("{}", " 🔍 스키마 미리보기".bright_white().bold());
    println!("{}", "═".repeat(50).bright_blue());

    for (i, source) in preview.sources.iter().enumerate() {
        println!(
            "  {}. {} [{}] {}건, 필드 {}개",
            i + 1,
            source.path.display().to_string().bright_cyan(),
            source.format,
            source.records,
            source.fields.len()
        );
        println!("     {}", source.columns.join(", ").dimmed());
    }

    println!(
        "\n  {} 정책: {} (배열: {:?})",
        "🧩".bright_magenta(),
        preview.policy,
        preview.array_mode
    );

    if preview.separate {
        println!("  {} 파일마다 자기 스키마로 출력됩니다", "ℹ️".bright_blue());
    } else {
        println!(
            "  {} 최종 컬럼 ({}): {}",
            "🧱".bright_white(),
            preview.columns.len(),
            preview.columns.join(", ").green()
        );
        if !preview.dropped_fields.is_empty() {
            println!(
                "  {} 제외 필드 ({}): {}",
                "⚠️".bright_yellow(),
                preview.dropped_fields.len(),
                preview.dropped_fields.join(", ").yellow()
            );
        }
    }

    println!("{}", "═".repeat(50).bright_blue());
}

/// 에러 종류, 파일, 위치를 함께 출력
fn print_error(err: &anyhow::Error) {
    eprintln!("\n{} {}", "❌".bright_red(), err.to_string().red());

    if let Some(e) = err.downcast_ref::<TabMergeError>() {
        eprintln!("   {} {}", "종류:".dimmed(), e.kind());
        if let Some(file) = e.file() {
            eprintln!("   {} {}", "파일:".dimmed(), file.display());
        }
        if let Some(location) = e.location() {
            eprintln!("   {} {}", "위치:".dimmed(), location);
        }
    }
}
