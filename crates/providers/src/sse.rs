//! Shared SSE streaming infrastructure for `RemoteApiEngine`.
//!
//! The remote engine's wire format is one `EngineEvent` JSON object per SSE
//! `data:` payload. This module extracts the two pieces every SSE consumer
//! needs: pulling complete `data:` payloads out of a raw byte buffer, and
//! driving a `reqwest::Response` body into a stream of parsed events.

use orc_domain::error::Result;
use orc_domain::stream::{BoxStream, EngineEvent};

use crate::util::from_reqwest;

/// Extract complete `data:` payloads from an SSE buffer.
///
/// SSE events are delimited by `\n\n`. Each event block may contain
/// `event:`, `data:`, `id:`, or `retry:` lines; only `data:` lines matter
/// here. The buffer is drained in-place: consumed bytes are removed and any
/// trailing partial event remains for the next call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Build a [`BoxStream`] of [`EngineEvent`]s from a `reqwest::Response`
/// whose body is an SSE stream of `EngineEvent` JSON payloads.
pub(crate) fn sse_response_stream(
    engine: String,
    response: reqwest::Response,
) -> BoxStream<'static, Result<EngineEvent>> {
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        if data == "[DONE]" {
                            continue;
                        }
                        yield parse_event(&data);
                    }
                }
                Ok(None) => {
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            if data == "[DONE]" {
                                continue;
                            }
                            yield parse_event(&data);
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(&engine, e));
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}

fn parse_event(data: &str) -> Result<EngineEvent> {
    serde_json::from_str(data).map_err(orc_domain::error::Error::Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_single_complete_event() {
        let mut buf = String::from("event: message\ndata: {\"hello\":\"world\"}\n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["{\"hello\":\"world\"}"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_multiple_events() {
        let mut buf = String::from("data: first\n\ndata: second\n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["first", "second"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_partial_event_stays_in_buffer() {
        let mut buf = String::from("data: complete\n\ndata: partial");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["complete"]);
        assert_eq!(buf, "data: partial");
    }

    #[test]
    fn drain_empty_buffer() {
        let mut buf = String::new();
        let lines = drain_data_lines(&mut buf);
        assert!(lines.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_skips_empty_data_lines() {
        let mut buf = String::from("data: \n\n");
        let lines = drain_data_lines(&mut buf);
        assert!(lines.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_ignores_non_data_lines() {
        let mut buf = String::from("event: ping\nid: 42\nretry: 5000\ndata: payload\n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["payload"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_incremental_buffering() {
        let mut buf = String::from("data: chunk1");
        let lines = drain_data_lines(&mut buf);
        assert!(lines.is_empty());
        assert_eq!(buf, "data: chunk1");

        buf.push_str("\n\ndata: chunk2\n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["chunk1", "chunk2"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn parse_event_decodes_delta() {
        let json = r#"{"type":"delta","seq":1,"text":"hi"}"#;
        let ev = parse_event(json).unwrap();
        assert!(matches!(ev, EngineEvent::Delta { seq: 1, .. }));
    }
}
