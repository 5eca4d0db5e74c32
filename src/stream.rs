// Stream reassembly for `stream: true` completions.
//
// The server sends one `data: <json>` line per token delta and finishes
// with `data: [DONE]`. Fragments are echoed to the sink as soon as they
// arrive and also collected so the caller gets the full answer back.

use crate::interrupt::InterruptFlag;
use crate::models::StreamChunk;
use std::io::{BufRead, Write};
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Result of reading one streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub content: String,
    /// `data:` frames seen, excluding the sentinel.
    pub frames: usize,
    /// Frames dropped because their payload was not valid JSON.
    pub skipped: usize,
    /// Whether `[DONE]` was seen before the body ended.
    pub finished: bool,
    /// Whether reading stopped because of Ctrl-C.
    pub interrupted: bool,
}

/// Read SSE lines from `reader` until `[DONE]` or end of input.
///
/// Malformed frames are skipped. A read error ends the stream early with
/// whatever was accumulated; it is logged but not returned, so a broken
/// connection still yields the partial answer. `interrupt` is checked
/// before each line; once set, reading stops and the flag is left set for
/// the caller.
pub fn reassemble<R: BufRead, W: Write + ?Sized>(
    reader: R,
    sink: &mut W,
    interrupt: &InterruptFlag,
) -> StreamSummary {
    let mut summary = StreamSummary::default();
    let mut reader = reader;
    let mut buf = Vec::new();

    loop {
        if interrupt.is_set() {
            summary.interrupted = true;
            break;
        }
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "stream read failed, keeping partial content");
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        if payload.trim() == DONE_SENTINEL {
            summary.finished = true;
            break;
        }

        summary.frames += 1;
        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => {
                if let Some(fragment) = chunk.content() {
                    summary.content.push_str(fragment);
                    // Echo failures must not abort the stream.
                    let _ = sink.write_all(fragment.as_bytes());
                    let _ = sink.flush();
                }
            }
            Err(e) => {
                summary.skipped += 1;
                debug!(error = %e, payload, "skipping malformed stream frame");
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn concatenates_deltas_until_done() {
        let body = format!("{}{}data: [DONE]\n", frame("A"), frame("B"));
        let mut echo = Vec::new();
        let summary = reassemble(Cursor::new(body), &mut echo, &InterruptFlag::new());
        assert_eq!(summary.content, "AB");
        assert_eq!(echo, b"AB");
        assert!(summary.finished);
        assert_eq!(summary.frames, 2);
    }

    #[test]
    fn malformed_frame_is_skipped() {
        let body = format!("{}data: {{not json\n{}data: [DONE]\n", frame("A"), frame("B"));
        let summary = reassemble(Cursor::new(body), &mut std::io::sink(), &InterruptFlag::new());
        assert_eq!(summary.content, "AB");
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn ignores_blank_and_unprefixed_lines() {
        let body = format!(
            "\n: keep-alive\nevent: message\n{}\r\n{}",
            frame("x").trim_end(),
            frame("y")
        );
        let summary = reassemble(Cursor::new(body), &mut std::io::sink(), &InterruptFlag::new());
        assert_eq!(summary.content, "xy");
        assert!(!summary.finished);
    }

    #[test]
    fn nothing_after_done_is_read() {
        let body = format!("{}data: [DONE]\n{}", frame("A"), frame("B"));
        let summary = reassemble(Cursor::new(body), &mut std::io::sink(), &InterruptFlag::new());
        assert_eq!(summary.content, "A");
    }

    /// Sink that raises the interrupt as soon as anything is echoed.
    struct InterruptOnWrite(InterruptFlag);

    impl Write for InterruptOnWrite {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.trigger();
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn interrupt_stops_between_lines() {
        let flag = InterruptFlag::new();
        let body = format!("{}{}data: [DONE]\n", frame("A"), frame("B"));
        let mut sink = InterruptOnWrite(flag.clone());
        let summary = reassemble(Cursor::new(body), &mut sink, &flag);
        assert_eq!(summary.content, "A");
        assert!(summary.interrupted);
        assert!(!summary.finished);
        assert!(flag.is_set());
    }

    #[test]
    fn works_through_a_trait_object_sink() {
        let body = format!("{}data: [DONE]\n", frame("dyn"));
        let mut echo = Vec::new();
        let sink: &mut dyn Write = &mut echo;
        let summary = reassemble(Cursor::new(body), sink, &InterruptFlag::new());
        assert_eq!(summary.content, "dyn");
        assert_eq!(echo, b"dyn");
    }

    #[test]
    fn frames_without_content_contribute_nothing() {
        let body = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\
                    data: {\"choices\":[]}\n\
                    data: [DONE]\n";
        let summary = reassemble(Cursor::new(body), &mut std::io::sink(), &InterruptFlag::new());
        assert_eq!(summary.content, "");
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.skipped, 0);
    }
}
