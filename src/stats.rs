//! 통계 및 유틸리티 모듈
//!
//! 작업 요약 수집과 포맷팅을 담당합니다.

use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::writer::OutputFile;

/// 작업 중 여러 워커가 함께 갱신하는 카운터
#[derive(Debug)]
pub struct JobCounters {
    /// 읽은 레코드 수
    pub records_read: AtomicU64,
    /// 쓴 레코드 수
    pub records_written: AtomicU64,
    /// 처리를 마친 입력 파일 수
    pub files_done: AtomicUsize,
    start_time: Instant,
}

impl Default for JobCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl JobCounters {
    pub fn new() -> Self {
        Self {
            records_read: AtomicU64::new(0),
            records_written: AtomicU64::new(0),
            files_done: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    /// 읽은 레코드 추가 후 누적값 반환
    pub fn add_read(&self, count: u64) -> u64 {
        self.records_read.fetch_add(count, Ordering::Relaxed) + count
    }

    pub fn add_written(&self, count: u64) {
        self.records_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn finish_file(&self) {
        self.files_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_read(&self) -> u64 {
        self.records_read.load(Ordering::Relaxed)
    }

    pub fn get_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn get_files_done(&self) -> usize {
        self.files_done.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 출력 목록과 함께 최종 요약 생성
    pub fn summarize(
        &self,
        outputs: Vec<OutputFile>,
        columns: Vec<String>,
        dropped_fields: Vec<String>,
    ) -> JobSummary {
        JobSummary {
            records_read: self.get_read(),
            records_written: self.get_written(),
            outputs,
            columns,
            dropped_fields,
            elapsed: self.elapsed(),
        }
    }
}

/// 작업 결과 요약
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub records_read: u64,
    pub records_written: u64,
    /// 완성된 출력 파일 (생성 순서)
    pub outputs: Vec<OutputFile>,
    /// 최종 컬럼 목록 (Keep Separate에서는 비어 있음)
    pub columns: Vec<String>,
    /// 정책에 의해 제외된 필드
    pub dropped_fields: Vec<String>,
    pub elapsed: Duration,
}

impl JobSummary {
    pub fn output_file_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn output_paths(&self) -> Vec<PathBuf> {
        self.outputs.iter().map(|o| o.path.clone()).collect()
    }

    pub fn bytes_written(&self) -> u64 {
        self.outputs.iter().map(|o| o.bytes).sum()
    }

    /// 요약 출력
    pub fn print_summary(&self, verbose: bool) {
        println!("\n{}", "═".repeat(50).bright_blue());
        println!("{}", " 📊 처리 통계".bright_white().bold());
        println!("{}", "═".repeat(50).bright_blue());

        println!(
            "  {} 읽은 레코드:  {}",
            "📥".bright_yellow(),
            self.records_read
        );
        println!(
            "  {} 쓴 레코드:    {}",
            "📤".bright_magenta(),
            self.records_written.to_string().green()
        );
        println!(
            "  {} 출력 파일:    {}",
            "📁".bright_cyan(),
            self.output_file_count()
        );
        println!(
            "  {} 출력 용량:    {}",
            "💾".bright_white(),
            format_bytes(self.bytes_written())
        );

        if !self.columns.is_empty() {
            println!(
                "  {} 컬럼 수:      {}",
                "🧱".bright_white(),
                self.columns.len()
            );
        }

        if self.dropped_fields.is_empty() {
            println!("  {} 제외 필드:    {}", "✅".bright_green(), "0".green());
        } else {
            println!(
                "  {} 제외 필드:    {}",
                "⚠️".bright_yellow(),
                self.dropped_fields.len().to_string().yellow()
            );
            for field in &self.dropped_fields {
                println!("      {} {}", "•".yellow(), field.dimmed());
            }
        }

        println!(
            "  {} 처리 시간:    {}",
            "⏱️".bright_cyan(),
            format_duration(self.elapsed)
        );

        if verbose {
            println!("\n{}", "📄 출력 파일 목록:".bright_cyan());
            for output in &self.outputs {
                println!(
                    "  {} {} ({}건, {})",
                    "•".green(),
                    output.path.display(),
                    output.records,
                    format_bytes(output.bytes)
                );
            }
        }

        println!("{}", "═".repeat(50).bright_blue());
    }
}

/// 바이트를 읽기 쉬운 형식으로 변환
///
/// # Examples
/// ```
/// use tabmerge::stats::format_bytes;
///
/// assert_eq!(format_bytes(500), "500 B");
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(1048576), "1.00 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// 경과 시간을 읽기 쉬운 형식으로 변환
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 3600 {
        format!("{}시간 {}분", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}분 {}초", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}.{:03}초", secs, millis)
    } else {
        format!("{}ms", millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1073741824), "1.00 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5.000초");
        assert_eq!(format_duration(Duration::from_secs(65)), "1분 5초");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1시간 1분");
    }

    #[test]
    fn test_counters_and_summary() {
        let counters = JobCounters::new();
        assert_eq!(counters.add_read(3), 3);
        assert_eq!(counters.add_read(2), 5);
        counters.add_written(4);
        counters.finish_file();

        let summary = counters.summarize(
            vec![
                OutputFile {
                    path: PathBuf::from("a.csv"),
                    records: 3,
                    bytes: 100,
                },
                OutputFile {
                    path: PathBuf::from("b.csv"),
                    records: 1,
                    bytes: 20,
                },
            ],
            vec!["id".to_string()],
            vec!["email".to_string()],
        );

        assert_eq!(summary.records_read, 5);
        assert_eq!(summary.records_written, 4);
        assert_eq!(summary.output_file_count(), 2);
        assert_eq!(summary.bytes_written(), 120);
        assert_eq!(counters.get_files_done(), 1);
    }
}
