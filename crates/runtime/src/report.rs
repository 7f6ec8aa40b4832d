//! At-exit execution report, controlled by the `VIPER_REPORT` env var:
//! - unset → no report, zero cost
//! - `1` → human-readable to stderr
//! - `json` → JSON to stderr
//! - `json:/path` → JSON to a file

use crate::heap_stats;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDestination {
    Stderr,
    File(String),
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub destination: ReportDestination,
}

impl ReportConfig {
    /// Parse `VIPER_REPORT`; `None` disables reporting.
    pub fn from_env() -> Option<ReportConfig> {
        let raw = std::env::var("VIPER_REPORT").ok()?;
        Self::parse(&raw)
    }

    fn parse(raw: &str) -> Option<ReportConfig> {
        match raw {
            "" | "0" => None,
            "1" => Some(ReportConfig {
                format: ReportFormat::Human,
                destination: ReportDestination::Stderr,
            }),
            "json" => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::Stderr,
            }),
            _ => raw.strip_prefix("json:").map(|path| ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::File(path.to_string()),
            }),
        }
    }
}

/// Execution facts supplied by the host (the VM CLI).
#[derive(Debug, Default, Serialize)]
pub struct ExecutionSummary {
    pub instructions: u64,
    pub exit_code: i32,
    pub trap: Option<String>,
}

#[derive(Serialize)]
struct ReportJson<'a> {
    #[serde(flatten)]
    execution: &'a ExecutionSummary,
    heap_live_objects: u64,
    heap_total_allocations: u64,
    heap_total_frees: u64,
    heap_live_bytes: u64,
}

/// Emit the report per `VIPER_REPORT`; silent when unset.
pub fn emit(summary: &ExecutionSummary) {
    let Some(config) = ReportConfig::from_env() else {
        return;
    };
    let body = render(&config.format, summary);
    match config.destination {
        ReportDestination::Stderr => {
            let _ = std::io::stderr().write_all(body.as_bytes());
        }
        ReportDestination::File(path) => {
            let _ = std::fs::write(path, body);
        }
    }
}

fn render(format: &ReportFormat, summary: &ExecutionSummary) -> String {
    match format {
        ReportFormat::Human => {
            let mut out = String::new();
            out.push_str("--- viper execution report ---\n");
            out.push_str(&format!("instructions:      {}\n", summary.instructions));
            out.push_str(&format!("exit code:         {}\n", summary.exit_code));
            if let Some(trap) = &summary.trap {
                out.push_str(&format!("trap:              {}\n", trap));
            }
            out.push_str(&format!("heap live objects: {}\n", heap_stats::live_objects()));
            out.push_str(&format!("heap allocations:  {}\n", heap_stats::total_allocations()));
            out.push_str(&format!("heap frees:        {}\n", heap_stats::total_frees()));
            out.push_str(&format!("heap live bytes:   {}\n", heap_stats::live_bytes()));
            out
        }
        ReportFormat::Json => {
            let report = ReportJson {
                execution: summary,
                heap_live_objects: heap_stats::live_objects(),
                heap_total_allocations: heap_stats::total_allocations(),
                heap_total_frees: heap_stats::total_frees(),
                heap_live_bytes: heap_stats::live_bytes(),
            };
            let mut body =
                serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string());
            body.push('\n');
            body
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_forms() {
        assert!(ReportConfig::parse("").is_none());
        assert!(ReportConfig::parse("0").is_none());
        let human = ReportConfig::parse("1").unwrap();
        assert_eq!(human.format, ReportFormat::Human);
        assert_eq!(human.destination, ReportDestination::Stderr);
        let json = ReportConfig::parse("json").unwrap();
        assert_eq!(json.format, ReportFormat::Json);
        let file = ReportConfig::parse("json:/tmp/report.json").unwrap();
        assert_eq!(file.destination, ReportDestination::File("/tmp/report.json".into()));
        assert!(ReportConfig::parse("yaml").is_none());
    }

    #[test]
    fn renders_both_formats() {
        let summary = ExecutionSummary {
            instructions: 12,
            exit_code: 0,
            trap: None,
        };
        let human = render(&ReportFormat::Human, &summary);
        assert!(human.contains("instructions:      12"));
        let json = render(&ReportFormat::Json, &summary);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["instructions"], 12);
        assert!(parsed["heap_total_allocations"].is_u64());
    }
}
