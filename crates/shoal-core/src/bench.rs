//! Parsing of swarm benchmark output.
//!
//! A benchmark run ends with two summary lines:
//!
//! ```text
//! Time taken for tests: 27.048s
//! Time per container: 535.584ms [mean] | 1252.565ms [90th] | 2002.064ms [99th]
//! ```

use serde::Serialize;
use thiserror::Error;

const TOTAL_PREFIX: &str = "Time taken for tests:";
const PER_CONTAINER_PREFIX: &str = "Time per container:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BenchError {
    #[error("benchmark output has no '{0}' line")]
    MissingLine(&'static str),
    #[error("malformed benchmark value '{0}'")]
    MalformedValue(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub value: f64,
    pub units: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeScore {
    pub value: f64,
    pub units: &'static str,
    /// `desc`: lower is better.
    pub direction: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchReport {
    #[serde(rename = "total-time")]
    pub total_time: Measurement,
    #[serde(rename = "mean-time")]
    pub mean_time: Measurement,
    #[serde(rename = "90th-percentile")]
    pub p90: Measurement,
    #[serde(rename = "99th-percentile")]
    pub p99: Measurement,
    pub composite: CompositeScore,
}

fn number(raw: &str, suffix: &str) -> Result<f64, BenchError> {
    let trimmed = raw.trim();
    trimmed
        .strip_suffix(suffix)
        .and_then(|n| n.trim().parse::<f64>().ok())
        .ok_or_else(|| BenchError::MalformedValue(trimmed.to_owned()))
}

fn last_line_with<'a>(output: &'a str, prefix: &'static str) -> Result<&'a str, BenchError> {
    output
        .lines()
        .rev()
        .find_map(|l| l.trim().strip_prefix(prefix))
        .ok_or(BenchError::MissingLine(prefix))
}

/// Per-container figure such as `535.584ms [mean] `.
fn per_container(raw: Option<&str>, tag: &str) -> Result<Measurement, BenchError> {
    let raw = raw.ok_or_else(|| BenchError::MalformedValue(format!("missing [{tag}]")))?;
    let value = raw
        .trim()
        .strip_suffix(&format!("[{tag}]"))
        .ok_or_else(|| BenchError::MalformedValue(raw.trim().to_owned()))?;
    Ok(Measurement {
        value: number(value, "ms")?,
        units: "ms",
    })
}

pub fn parse_bench_report(output: &str) -> Result<BenchReport, BenchError> {
    let total = number(last_line_with(output, TOTAL_PREFIX)?, "s")?;
    let mut parts = last_line_with(output, PER_CONTAINER_PREFIX)?.split('|');
    let mean_time = per_container(parts.next(), "mean")?;
    let p90 = per_container(parts.next(), "90th")?;
    let p99 = per_container(parts.next(), "99th")?;

    Ok(BenchReport {
        total_time: Measurement {
            value: total,
            units: "s",
        },
        mean_time,
        p90,
        p99,
        composite: CompositeScore {
            value: total,
            units: "sec",
            direction: "desc",
        },
    })
}
