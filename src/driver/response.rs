//! Target response parsing.
//!
//! The target marks its result with a sentinel line; everything else on
//! stdout is diagnostic. The parser takes the *last* sentinel so a target
//! that echoes its own invocation (or loops) still reports its final
//! result. The next non-empty line must be `{"result": {<name>: <number>,
//! ...}}`; non-finite values are dropped individually while the rest of
//! the reading survives.

use crate::error::EngineWarning;
use crate::store::MetricReading;

/// Exact sentinel line the target must print before its JSON result.
pub const RESULT_SENTINEL: &str = "v^v^v^RESULT^v^v^v";

/// Why a response could not be parsed. Rendered into `ResponseParseError`
/// with trial context by the driver.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("no sentinel line in target output")]
    MissingSentinel,
    #[error("no payload line after the sentinel")]
    MissingPayload,
    #[error("payload is not valid JSON: {0}")]
    Json(String),
    #[error("payload has no 'result' object")]
    MissingResultKey,
}

/// Extract the metric reading from captured stdout.
pub fn parse_response(
    stdout: &str,
    run: usize,
    repetition: usize,
) -> Result<(MetricReading, Vec<EngineWarning>), ResponseError> {
    let lines: Vec<&str> = stdout.lines().collect();
    let sentinel_index = lines
        .iter()
        .rposition(|line| line.trim_end_matches('\r') == RESULT_SENTINEL)
        .ok_or(ResponseError::MissingSentinel)?;

    let payload = lines[sentinel_index + 1..]
        .iter()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .ok_or(ResponseError::MissingPayload)?;

    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| ResponseError::Json(e.to_string()))?;
    let result = value
        .get("result")
        .and_then(serde_json::Value::as_object)
        .ok_or(ResponseError::MissingResultKey)?;

    let mut reading = MetricReading::new();
    let mut warnings = Vec::new();
    for (metric, raw) in result {
        match raw.as_f64().filter(|v| v.is_finite()) {
            Some(v) => {
                reading.insert(metric.clone(), v);
            }
            None => warnings.push(EngineWarning::NonFiniteMetric {
                run,
                repetition,
                metric: metric.clone(),
            }),
        }
    }
    Ok((reading, warnings))
}
