//! Sentinel framing
//!
//! The remote channel is shared with unrelated tool chatter (deprecation
//! notices, banners, PHP warnings). Runtime scripts print their JSON result
//! between two literal markers:
//!
//! ```text
//! <noise>__DSTART<json-payload>__DEND<noise>
//! ```
//!
//! Decoding takes the bytes strictly between the first start marker and the
//! first end marker that follows it.

use crate::error::DecodeError;
use serde::de::DeserializeOwned;

/// Marker printed immediately before the payload
pub const START_MARKER: &str = "__DSTART";

/// Marker printed immediately after the payload
pub const END_MARKER: &str = "__DEND";

/// Slice the framed payload out of noisy output
///
/// # Errors
/// - `DecodeError::MissingStartMarker` carrying the whole output
/// - `DecodeError::MissingEndMarker` carrying everything after the start marker
pub fn extract_payload(output: &str) -> Result<&str, DecodeError> {
    let start = output
        .find(START_MARKER)
        .ok_or_else(|| DecodeError::MissingStartMarker {
            raw: output.to_string(),
        })?
        + START_MARKER.len();

    let rest = &output[start..];
    let end = rest
        .find(END_MARKER)
        .ok_or_else(|| DecodeError::MissingEndMarker {
            raw: rest.to_string(),
        })?;

    Ok(&rest[..end])
}

/// Extract and parse a sentinel-framed JSON payload
///
/// # Errors
/// Any framing error from [`extract_payload`], or `DecodeError::InvalidJson`
/// carrying the framed slice.
pub fn decode_sentinel_payload<T: DeserializeOwned>(output: &str) -> Result<T, DecodeError> {
    let payload = extract_payload(output).map_err(logged)?;
    serde_json::from_str(payload).map_err(|source| {
        logged(DecodeError::InvalidJson {
            raw: payload.to_string(),
            source,
        })
    })
}

/// Parse a plain JSON document (e.g. `drush ... --format=json` output)
///
/// # Errors
/// `DecodeError::InvalidJson` carrying the trimmed output.
pub fn decode_json<T: DeserializeOwned>(output: &str) -> Result<T, DecodeError> {
    let trimmed = output.trim();
    serde_json::from_str(trimmed).map_err(|source| {
        logged(DecodeError::InvalidJson {
            raw: trimmed.to_string(),
            source,
        })
    })
}

/// Trimmed text output; never fails
///
/// # Errors
/// Infallible; the signature matches the decoder contract.
pub fn decode_text(output: &str) -> Result<String, DecodeError> {
    Ok(output.trim().to_string())
}

fn logged(err: DecodeError) -> DecodeError {
    let first_line = err.raw().lines().next().unwrap_or_default();
    tracing::error!("failed to parse json output starting with: {first_line}");
    tracing::debug!(raw = err.raw(), "undecodable remote output");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    #[test]
    fn extracts_payload_between_noise() {
        let output = "WARN: deprecated\n__DSTART{\"a\":1}__DEND\n";
        let value: Value = decode_sentinel_payload(output).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn trailing_noise_after_end_marker_is_ignored() {
        let output = "__DSTART[1,2]__DEND\nPHP Notice: something\n__DEND";
        let value: Vec<u8> = decode_sentinel_payload(output).unwrap();
        assert_eq!(value, vec![1, 2]);
    }

    #[test]
    fn missing_start_marker_keeps_whole_output() {
        let err = decode_sentinel_payload::<Value>("no markers here").unwrap_err();
        assert!(matches!(err, DecodeError::MissingStartMarker { .. }));
        assert_eq!(err.raw(), "no markers here");
    }

    #[test]
    fn reversed_markers_fail_with_raw_slice() {
        let output = "__DEND junk __DSTART{\"a\":1}";
        let err = decode_sentinel_payload::<Value>(output).unwrap_err();
        assert!(matches!(err, DecodeError::MissingEndMarker { .. }));
        assert_eq!(err.raw(), "{\"a\":1}");
    }

    #[test]
    fn invalid_json_keeps_framed_slice() {
        let err = decode_sentinel_payload::<Value>("x__DSTART{not json}__DENDy").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson { .. }));
        assert_eq!(err.raw(), "{not json}");
    }

    #[test]
    fn empty_payload_is_invalid_json() {
        let err = decode_sentinel_payload::<Value>("__DSTART__DEND").unwrap_err();
        assert_eq!(err.raw(), "");
    }

    #[test]
    fn decode_json_trims_whitespace() {
        let value: Value = decode_json("\n {\"status\": \"ok\"}\n").unwrap();
        assert_eq!(value["status"], "ok");
    }

    proptest! {
        #[test]
        fn noise_without_markers_never_affects_payload(
            prefix in "[a-zA-Z0-9 :\\n]{0,40}",
            suffix in "[a-zA-Z0-9 :\\n]{0,40}",
            n in any::<i64>(),
        ) {
            let output = format!("{prefix}{START_MARKER}{n}{END_MARKER}{suffix}");
            let value: i64 = decode_sentinel_payload(&output).unwrap();
            prop_assert_eq!(value, n);
        }
    }
}
