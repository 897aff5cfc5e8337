//! Parsing and validation of page.signal.v1 recordings
//!
//! Two encodings are accepted: a single JSON document, or NDJSON whose first
//! line is the [`RecordingHeader`] and every further line one
//! [`RecordedSignal`].

use crate::error::ObserverError;
use crate::signal::recorded::*;

/// Adapter between recording encodings and [`PageRecording`]
pub struct RecordingAdapter;

impl RecordingAdapter {
    /// Parse a recording stored as one JSON document
    pub fn parse_json(json: &str) -> Result<PageRecording, ObserverError> {
        let recording: PageRecording = serde_json::from_str(json)?;
        Ok(recording)
    }

    /// Parse NDJSON: header line, then one signal per line
    pub fn parse_ndjson(ndjson: &str) -> Result<PageRecording, ObserverError> {
        let mut lines = ndjson
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let header = match lines.next() {
            Some((line_num, line)) => serde_json::from_str::<RecordingHeader>(line.trim())
                .map_err(|e| {
                    ObserverError::ParseError(format!(
                        "Failed to parse header on line {}: {}",
                        line_num + 1,
                        e
                    ))
                })?,
            None => {
                return Err(ObserverError::ParseError(
                    "Empty recording: missing header line".to_string(),
                ))
            }
        };

        let mut signals = Vec::new();
        for (line_num, line) in lines {
            match serde_json::from_str::<RecordedSignal>(line.trim()) {
                Ok(signal) => signals.push(signal),
                Err(e) => {
                    return Err(ObserverError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }

        Ok(PageRecording::from_parts(header, signals))
    }

    /// Encode as NDJSON, the inverse of [`RecordingAdapter::parse_ndjson`]
    pub fn to_ndjson(recording: &PageRecording) -> Result<String, ObserverError> {
        let mut out = serde_json::to_string(&recording.header())?;
        out.push('\n');
        for signal in &recording.signals {
            out.push_str(&serde_json::to_string(signal)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Validate every signal; returns only the failures
    pub fn validate_signals(recording: &PageRecording) -> Vec<ValidationResult> {
        let known_fields = recording.known_fields();
        let mut previous_at = None;
        let mut failures = Vec::new();

        for (index, signal) in recording.signals.iter().enumerate() {
            if let Err(error) = signal.validate(previous_at, &known_fields) {
                failures.push(ValidationResult {
                    index,
                    kind: signal.signal.kind(),
                    at_ms: signal.at_ms,
                    error,
                });
            }
            previous_at = Some(previous_at.map_or(signal.at_ms, |p: u64| p.max(signal.at_ms)));
        }

        failures
    }

    /// Header check followed by per-signal checks, as a single error
    pub fn validate(recording: &PageRecording) -> Result<(), ObserverError> {
        recording
            .validate()
            .map_err(|e| ObserverError::InvalidSignal(e.to_string()))?;

        match Self::validate_signals(recording).first() {
            None => Ok(()),
            Some(failure) => Err(ObserverError::InvalidSignal(failure.to_string())),
        }
    }
}

/// A signal that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub index: usize,
    pub kind: &'static str,
    pub at_ms: u64,
    pub error: ValidationError,
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "signal {} ({} at {}ms): {}",
            self.index, self.kind, self.at_ms, self.error
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{InputField, PageSnapshot};
    use crate::observer::{ClickTarget, InputChange};
    use pretty_assertions::assert_eq;

    const NDJSON: &str = r#"{"schema_version":"page.signal.v1","page":{"href":"https://shop.test/catalog/","input_fields":[{"key":"q","input_type":"search"}]}}
{"at_ms":0,"signal":{"type":"scroll","scroll_top":420,"scroll_height":2000,"client_height":1000}}

{"at_ms":1200,"signal":{"type":"input","field":"q","value":"boots"}}
{"at_ms":5000,"signal":{"type":"before_unload"}}
"#;

    #[test]
    fn test_parse_ndjson() {
        let recording = RecordingAdapter::parse_ndjson(NDJSON).unwrap();
        assert_eq!(recording.page.href, "https://shop.test/catalog/");
        assert_eq!(recording.signals.len(), 3);
        assert_eq!(recording.signals[1].signal.kind(), "input");
        assert!(RecordingAdapter::validate(&recording).is_ok());
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let broken = "{\"schema_version\":\"page.signal.v1\",\"page\":{\"href\":\"https://shop.test/\"}}\n{\"at_ms\": \"soon\"}\n";
        let err = RecordingAdapter::parse_ndjson(broken).unwrap_err();
        match err {
            ObserverError::ParseError(msg) => assert!(msg.contains("line 2"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_ndjson_empty() {
        assert!(matches!(
            RecordingAdapter::parse_ndjson("\n  \n"),
            Err(ObserverError::ParseError(_))
        ));
    }

    #[test]
    fn test_ndjson_and_json_agree() {
        let recording = RecordingAdapter::parse_ndjson(NDJSON).unwrap();
        let ndjson = RecordingAdapter::to_ndjson(&recording).unwrap();
        assert_eq!(ndjson.lines().count(), 4);

        let json = serde_json::to_string(&recording).unwrap();
        assert_eq!(RecordingAdapter::parse_json(&json).unwrap(), recording);
    }

    #[test]
    fn test_validate_signals_collects_every_failure() {
        let page = PageSnapshot::new("https://shop.test/").with_input_field(InputField {
            key: "q".to_string(),
            ..Default::default()
        });
        let recording = PageRecording::new(page)
            .with_signal(500, RecordedAction::Click(ClickTarget::new("BUTTON")))
            .with_signal(
                100,
                RecordedAction::Input(InputChange {
                    field: "q".to_string(),
                    value: "abc".to_string(),
                }),
            )
            .with_signal(
                600,
                RecordedAction::Input(InputChange {
                    field: "nope".to_string(),
                    value: "abc".to_string(),
                }),
            );

        let failures = RecordingAdapter::validate_signals(&recording);
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].index, 1);
        assert_eq!(
            failures[0].error,
            ValidationError::OutOfOrder {
                previous: 500,
                at_ms: 100
            }
        );
        assert_eq!(failures[1].index, 2);
        assert_eq!(failures[1].kind, "input");

        let err = RecordingAdapter::validate(&recording).unwrap_err();
        assert!(err.to_string().contains("signal 1"));
    }
}
