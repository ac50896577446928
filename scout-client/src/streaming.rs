//! Server-sent event decoding for the search stream.
//!
//! The search endpoint frames each event as one `data: <payload>` line:
//! ```text
//! data: {"content": "Hel"}
//!
//! data: {"content": "lo"}
//!
//! data: [DONE]
//! ```
//! A payload is either a JSON record with a `content` string, a JSON record
//! with an `error` string, or the `[DONE]` sentinel. The transport delivers
//! bytes with no regard for line (or even UTF-8 character) boundaries, so the
//! decoder carries a partial line and any incomplete character across reads.
//!
//! Policies:
//! - `[DONE]` is a hard stop for the whole stream. Lines after it, in the same
//!   read or later ones, are never looked at and the connection is released.
//! - A payload that is not valid JSON is logged and skipped; decoding goes on.
//! - A JSON payload with neither a non-empty `error` nor a non-empty `content`
//!   string is ignored. `error` wins when both are present.
//! - End of body without the sentinel yields an implicit [`StreamFrame::Done`].
//! - In-band error frames do not stop the decoder; the consumer decides.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Response;
use scout_types::{ClientError, FrameStream, StreamFrame};
use tokio_util::sync::CancellationToken;

use crate::error::map_reqwest_error;

/// Line prefix marking an event payload.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that ends the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Wrap an HTTP response body into a [`FrameStream`].
///
/// The body is consumed lazily; dropping the stream or cancelling `cancel`
/// releases the connection.
pub(crate) fn stream_frames(
    response: Response,
    cancel: CancellationToken,
    timeout: Duration,
) -> FrameStream {
    let byte_stream = response
        .bytes_stream()
        .map(move |chunk| chunk.map_err(|e| map_reqwest_error(e, timeout)));
    FrameStream {
        receiver: Box::pin(decode_frames(byte_stream, cancel)),
    }
}

/// Decode a raw byte stream into frames.
///
/// An `Err` from the byte stream is forwarded once and ends the stream.
/// Cancellation ends the stream without any further item, not even an
/// implicit `Done`.
pub fn decode_frames<S>(
    byte_stream: S,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<StreamFrame, ClientError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
{
    async_stream::stream! {
        let mut decoder = FrameDecoder::new();
        let mut bytes_stream = std::pin::pin!(byte_stream);

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                next = bytes_stream.next() => Some(next),
            };
            let Some(next) = next else {
                tracing::debug!("search stream canceled");
                return;
            };
            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    yield Err(e);
                    return;
                }
                None => break,
            };

            for frame in decoder.feed(&chunk) {
                yield Ok(frame);
            }
            if decoder.is_finished() {
                return;
            }
        }

        for frame in decoder.finish() {
            yield Ok(frame);
        }
    }
}

/// Incremental decoder from byte chunks to [`StreamFrame`]s.
///
/// Pure: feeding the same bytes under any chunking yields the same frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Decoded text not yet terminated by a newline.
    line_buf: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    /// Set once `[DONE]` was seen or `finish` ran.
    finished: bool,
}

impl FrameDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the decoder has produced its terminal `Done`.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume one chunk and return the frames its complete lines produce.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        if self.finished {
            return Vec::new();
        }
        self.push_bytes(chunk);

        let mut frames = Vec::new();
        while let Some(newline_pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=newline_pos).collect();
            if let Some(frame) = process_line(&line) {
                let done = frame.is_done();
                frames.push(frame);
                if done {
                    self.finish_now();
                    break;
                }
            }
        }
        frames
    }

    /// Signal end of input: decode any unterminated last line and close the
    /// stream with `Done` unless the sentinel already did.
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        if self.finished {
            return Vec::new();
        }
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.line_buf.push_str(&String::from_utf8_lossy(&tail));
        }
        let remaining = std::mem::take(&mut self.line_buf);

        let mut frames = Vec::new();
        if let Some(frame) = process_line(&remaining) {
            frames.push(frame);
        }
        if !frames.last().is_some_and(StreamFrame::is_done) {
            frames.push(StreamFrame::Done);
        }
        self.finish_now();
        frames
    }

    fn finish_now(&mut self) {
        self.finished = true;
        self.line_buf.clear();
        self.pending.clear();
    }

    /// Append bytes to the line buffer, holding back an incomplete trailing
    /// UTF-8 sequence and replacing invalid ones with U+FFFD.
    fn push_bytes(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.line_buf.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.line_buf
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(invalid) => {
                            self.line_buf.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                    }
                }
            }
        }
    }
}

/// Turn one line into at most one frame.
fn process_line(line: &str) -> Option<StreamFrame> {
    let line = line.trim_end_matches(['\n', '\r']);
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();

    if payload == DONE_SENTINEL {
        return Some(StreamFrame::Done);
    }

    let json: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, payload, "skipping malformed stream frame");
            return None;
        }
    };

    if let Some(message) = non_empty_str(&json, "error") {
        return Some(StreamFrame::Error(message.to_string()));
    }
    if let Some(content) = non_empty_str(&json, "content") {
        return Some(StreamFrame::Content(content.to_string()));
    }
    tracing::debug!(payload, "ignoring stream frame without content or error");
    None
}

fn non_empty_str<'a>(json: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    json.get(field)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.is_empty())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn content(s: &str) -> StreamFrame {
        StreamFrame::Content(s.to_string())
    }

    fn feed_all(chunks: &[&[u8]]) -> Vec<StreamFrame> {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            frames.extend(decoder.feed(chunk));
        }
        frames.extend(decoder.finish());
        frames
    }

    fn collect(chunks: Vec<Result<Bytes, ClientError>>) -> Vec<Result<StreamFrame, ClientError>> {
        let stream = decode_frames(futures::stream::iter(chunks), CancellationToken::new());
        futures::executor::block_on(stream.collect())
    }

    #[test]
    fn hello_scenario() {
        let frames = feed_all(&[
            b"data: {\"content\":\"Hel\"}\n",
            b"data: {\"content\":\"lo\"}\n",
            b"data: [DONE]\n",
        ]);
        assert_eq!(frames, [content("Hel"), content("lo"), StreamFrame::Done]);
    }

    #[test]
    fn partial_line_is_held_until_newline() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"data: {\"conte").is_empty());
        assert!(decoder.feed(b"nt\":\"A\"}").is_empty());
        assert_eq!(decoder.feed(b"\n"), [content("A")]);
    }

    #[test]
    fn split_mid_json_accumulates_ab() {
        let frames = feed_all(&[b"data: {\"content\": \"A\"}\ndata: {\"con", b"tent\": \"B\"}\n"]);
        let text: String = frames
            .iter()
            .filter_map(|f| match f {
                StreamFrame::Content(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "AB");
    }

    #[test]
    fn malformed_frame_does_not_stop_stream() {
        let frames = feed_all(&[
            b"data: {\"content\":\"one\"}\n",
            b"data: {not json\n",
            b"data: {\"content\":\"two\"}\n",
        ]);
        assert_eq!(frames, [content("one"), content("two"), StreamFrame::Done]);
    }

    #[test]
    fn done_stops_rest_of_chunk_and_later_chunks() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(b"data: {\"content\":\"x\"}\ndata: [DONE]\ndata: {\"content\":\"y\"}\n");
        assert_eq!(frames, [content("x"), StreamFrame::Done]);
        assert!(decoder.is_finished());
        assert!(decoder.feed(b"data: {\"content\":\"z\"}\n").is_empty());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn error_frame_is_emitted_and_decoding_continues() {
        let frames = feed_all(&[b"data: {\"error\":\"model overloaded\"}\ndata: {\"content\":\"late\"}\n"]);
        assert_eq!(
            frames,
            [
                StreamFrame::Error("model overloaded".into()),
                content("late"),
                StreamFrame::Done
            ]
        );
    }

    #[test]
    fn error_wins_over_content() {
        let frames = feed_all(&[b"data: {\"content\":\"c\",\"error\":\"e\"}\n"]);
        assert_eq!(frames[0], StreamFrame::Error("e".into()));
    }

    #[test]
    fn unknown_shapes_are_ignored() {
        let frames = feed_all(&[
            b"data: {\"status\":\"thinking\"}\n",
            b"data: 42\n",
            b"data: {\"content\":\"\"}\n",
            b"data: {\"content\":7}\n",
            b"event: ping\n",
            b": keep-alive\n",
            b"\n",
        ]);
        assert_eq!(frames, [StreamFrame::Done]);
    }

    #[test]
    fn crlf_and_blank_separators() {
        let frames = feed_all(&[b"data: {\"content\":\"a\"}\r\n\r\ndata: [DONE]\r\n\r\n"]);
        assert_eq!(frames, [content("a"), StreamFrame::Done]);
    }

    #[test]
    fn payload_whitespace_is_trimmed() {
        let frames = feed_all(&[b"data:    [DONE]   \n"]);
        assert_eq!(frames, [StreamFrame::Done]);
    }

    #[test]
    fn unterminated_last_line_is_decoded_at_end() {
        let frames = feed_all(&[b"data: {\"content\":\"tail\"}"]);
        assert_eq!(frames, [content("tail"), StreamFrame::Done]);

        let frames = feed_all(&[b"data: [DONE]"]);
        assert_eq!(frames, [StreamFrame::Done]);
    }

    #[test]
    fn multibyte_character_split_across_reads() {
        let bytes = "data: {\"content\":\"héllo ✓\"}\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let frames = feed_all(&[&bytes[..split], &bytes[split..]]);
        assert_eq!(frames, [content("héllo ✓"), StreamFrame::Done]);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let frames = feed_all(&[b"data: {\"content\":\"a\xFFb\"}\n"]);
        assert_eq!(frames, [content("a\u{FFFD}b"), StreamFrame::Done]);
    }

    #[test]
    fn empty_body_yields_implicit_done() {
        assert_eq!(feed_all(&[]), [StreamFrame::Done]);
    }

    #[test]
    fn stream_stops_after_sentinel() {
        let items = collect(vec![
            Ok(Bytes::from_static(b"data: {\"content\":\"a\"}\ndata: [DONE]\n")),
            Ok(Bytes::from_static(b"data: {\"content\":\"never\"}\n")),
        ]);
        let frames: Vec<_> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(frames, [content("a"), StreamFrame::Done]);
    }

    #[test]
    fn transport_error_is_forwarded_and_ends_stream() {
        let items = collect(vec![
            Ok(Bytes::from_static(b"data: {\"content\":\"a\"}\n")),
            Err(ClientError::Network("connection reset".into())),
            Ok(Bytes::from_static(b"data: {\"content\":\"b\"}\n")),
        ]);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &content("a"));
        assert!(matches!(items[1], Err(ClientError::Network(_))));
    }

    #[test]
    fn canceled_stream_ends_without_done() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream = decode_frames(
            futures::stream::iter(vec![Ok(Bytes::from_static(b"data: {\"content\":\"a\"}\n"))]),
            cancel,
        );
        let items: Vec<_> = futures::executor::block_on(stream.collect());
        assert!(items.is_empty());
    }
}
