//! Bounded body prefix capture.
//!
//! Reads at most one frame past the byte cap, then stitches the buffered
//! prefix back in front of the unread remainder so downstream consumers see
//! the original body.

use axum::body::{Body, HttpBody};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use http_body_util::BodyExt;
use std::time::Duration;

use crate::policy::ActiveMasks;
use crate::record::BodyCapture;

/// How reading the prefix ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixState {
    /// The whole body was read
    Complete,
    /// More than the cap was available; the rest was left unread
    Exceeded,
    /// The read deadline passed before the body ended or exceeded the cap
    TimedOut(Duration),
    /// The body produced an error; it is replayed to the consumer
    Failed(String),
}

/// Bytes kept past the cap so masked values ending just after it still match
const MASK_LOOKAHEAD: usize = 256;

/// Prefix read from a body
#[derive(Debug, Clone)]
pub struct BodyPrefix {
    head: Vec<u8>,
    bytes_read: usize,
    exact_len: Option<u64>,
    state: PrefixState,
}

impl BodyPrefix {
    pub fn state(&self) -> &PrefixState {
        &self.state
    }

    /// Total bytes pulled from the body, which may exceed the cap by one frame
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Body length when known: read to the end, or announced by the body itself
    pub fn size(&self) -> u64 {
        match self.state {
            PrefixState::Complete => self.bytes_read as u64,
            _ => self.exact_len.unwrap_or(self.bytes_read as u64),
        }
    }

    /// Turn the prefix into a record field
    ///
    /// The snippet is decoded as UTF-8, masked, and kept within `cap` bytes.
    /// Masking sees up to [`MASK_LOOKAHEAD`] bytes past the cap, and a masked
    /// value cut off at the end of the buffer is masked as well.
    /// `truncated` reflects whether the body was larger than `cap`.
    pub fn into_capture(
        self,
        cap: usize,
        masks: &ActiveMasks<'_>,
        content_type: Option<&str>,
    ) -> BodyCapture {
        match self.state {
            PrefixState::Failed(reason) => {
                return BodyCapture::unavailable(format!("failed to read body: {}", reason));
            }
            PrefixState::TimedOut(after) => {
                return BodyCapture::unavailable(format!(
                    "body read timed out after {}ms",
                    after.as_millis()
                ));
            }
            PrefixState::Complete | PrefixState::Exceeded => {}
        }

        if self.bytes_read == 0 {
            return BodyCapture::Empty;
        }

        let size = self.size();
        let text = match std::str::from_utf8(&self.head) {
            Ok(text) => text,
            // The buffer ends inside a multi-byte character; drop the partial tail
            Err(e) if e.error_len().is_none() => {
                match std::str::from_utf8(&self.head[..e.valid_up_to()]) {
                    Ok(text) => text,
                    Err(_) => return BodyCapture::unavailable("body is not valid UTF-8"),
                }
            }
            Err(_) => return BodyCapture::unavailable("body is not valid UTF-8"),
        };

        let mut snippet = masks.mask_body(text, content_type);
        if snippet.len() > cap {
            let mut end = cap;
            while !snippet.is_char_boundary(end) {
                end -= 1;
            }
            snippet.truncate(end);
        }

        BodyCapture::Captured {
            snippet,
            size,
            truncated: self.bytes_read > cap,
        }
    }
}

/// Read up to `cap` bytes (plus at most one frame) from `body`
///
/// Returns a body equivalent to the input and the captured prefix. Reading
/// stops at the cap, at the end of the body, on a read error, or when
/// `timeout` elapses. Trailers are not preserved when the body is re-chained.
pub async fn read_body_prefix(body: Body, cap: usize, timeout: Duration) -> (Body, BodyPrefix) {
    if body.is_end_stream() {
        let prefix = BodyPrefix {
            head: Vec::new(),
            bytes_read: 0,
            exact_len: Some(0),
            state: PrefixState::Complete,
        };
        return (body, prefix);
    }

    let exact_len = body.size_hint().exact();
    let keep = cap.saturating_add(MASK_LOOKAHEAD);
    let mut body = body;
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut bytes_read = 0usize;
    let deadline = tokio::time::Instant::now() + timeout;

    let state = loop {
        if bytes_read > cap {
            break PrefixState::Exceeded;
        }
        match tokio::time::timeout_at(deadline, body.frame()).await {
            Err(_) => {
                tracing::debug!(bytes_read, ?timeout, "body capture timed out");
                break PrefixState::TimedOut(timeout);
            }
            Ok(None) => break PrefixState::Complete,
            Ok(Some(Err(e))) => {
                tracing::debug!(bytes_read, error = %e, "body capture read failed");
                let prefix = BodyPrefix {
                    head: head_of(&chunks, keep),
                    bytes_read,
                    exact_len,
                    state: PrefixState::Failed(e.to_string()),
                };
                let replay = chunks.into_iter().map(Ok).chain(std::iter::once(Err(e)));
                return (Body::from_stream(stream::iter(replay)), prefix);
            }
            Ok(Some(Ok(frame))) => {
                if let Ok(data) = frame.into_data() {
                    bytes_read += data.len();
                    if !data.is_empty() {
                        chunks.push(data);
                    }
                }
            }
        }
    };

    let head = head_of(&chunks, keep);
    let rebuilt = match state {
        PrefixState::Complete => Body::from(concat(chunks)),
        _ => {
            let buffered = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
            Body::from_stream(buffered.chain(body.into_data_stream()))
        }
    };

    (
        rebuilt,
        BodyPrefix {
            head,
            bytes_read,
            exact_len,
            state,
        },
    )
}

fn head_of(chunks: &[Bytes], cap: usize) -> Vec<u8> {
    let mut head = Vec::with_capacity(cap.min(chunks.iter().map(Bytes::len).sum()));
    for chunk in chunks {
        let room = cap - head.len();
        if room == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
    head
}

fn concat(mut chunks: Vec<Bytes>) -> Bytes {
    match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.remove(0),
        _ => Bytes::from(chunks.concat()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Masker, MaskRule};
    use axum::http::Method;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn no_masks() -> Masker {
        Masker::default()
    }

    async fn collect(body: Body) -> Vec<u8> {
        body.collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_small_body_is_fully_captured() {
        let (body, prefix) = read_body_prefix(Body::from("hello"), 16, TIMEOUT).await;
        assert_eq!(prefix.state(), &PrefixState::Complete);
        assert_eq!(collect(body).await, b"hello");

        let masker = no_masks();
        let capture = prefix.into_capture(16, &masker.select(&Method::GET, "/"), None);
        assert_eq!(
            capture,
            BodyCapture::Captured {
                snippet: "hello".to_string(),
                size: 5,
                truncated: false,
            }
        );
    }

    #[tokio::test]
    async fn test_body_at_exact_cap_is_not_truncated() {
        let (_, prefix) = read_body_prefix(Body::from("abcd"), 4, TIMEOUT).await;
        let masker = no_masks();
        let capture = prefix.into_capture(4, &masker.select(&Method::GET, "/"), None);
        assert_eq!(capture.snippet(), Some("abcd"));
        assert!(!capture.is_truncated());
    }

    #[tokio::test]
    async fn test_large_streamed_body_is_capped_and_preserved() {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            (0..64).map(|_| Ok(Bytes::from(vec![b'x'; 1024]))).collect();
        let body = Body::from_stream(stream::iter(chunks));

        let (body, prefix) = read_body_prefix(body, 1500, TIMEOUT).await;
        assert_eq!(prefix.state(), &PrefixState::Exceeded);
        assert_eq!(prefix.bytes_read(), 2048);
        assert_eq!(collect(body).await.len(), 64 * 1024);

        let masker = no_masks();
        let capture = prefix.into_capture(1500, &masker.select(&Method::POST, "/"), None);
        assert_eq!(capture.snippet().map(str::len), Some(1500));
        assert!(capture.is_truncated());
    }

    #[tokio::test]
    async fn test_empty_body() {
        let (body, prefix) = read_body_prefix(Body::empty(), 16, TIMEOUT).await;
        assert_eq!(collect(body).await, b"");
        let masker = no_masks();
        let capture = prefix.into_capture(16, &masker.select(&Method::GET, "/"), None);
        assert_eq!(capture, BodyCapture::Empty);
    }

    #[tokio::test]
    async fn test_zero_cap_flags_any_content_as_truncated() {
        let (body, prefix) = read_body_prefix(Body::from("x"), 0, TIMEOUT).await;
        assert_eq!(collect(body).await, b"x");
        let masker = no_masks();
        let capture = prefix.into_capture(0, &masker.select(&Method::GET, "/"), None);
        assert_eq!(capture.snippet(), Some(""));
        assert!(capture.is_truncated());
    }

    #[tokio::test]
    async fn test_split_multibyte_character_is_dropped() {
        // "é" is two bytes; a cap of 2 splits the second one
        let (_, prefix) = read_body_prefix(Body::from("aé"), 2, TIMEOUT).await;
        let masker = no_masks();
        let capture = prefix.into_capture(2, &masker.select(&Method::GET, "/"), None);
        assert_eq!(capture.snippet(), Some("a"));
        assert!(capture.is_truncated());
    }

    #[tokio::test]
    async fn test_binary_body_is_unavailable() {
        let (_, prefix) = read_body_prefix(Body::from(vec![0xff, 0xfe, 0x00]), 16, TIMEOUT).await;
        let masker = no_masks();
        let capture = prefix.into_capture(16, &masker.select(&Method::GET, "/"), None);
        assert!(matches!(capture, BodyCapture::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_read_error_is_marked_and_replayed() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"part")),
            Err(std::io::Error::other("connection reset")),
        ];
        let (body, prefix) = read_body_prefix(Body::from_stream(stream::iter(chunks)), 64, TIMEOUT).await;
        assert!(matches!(prefix.state(), PrefixState::Failed(_)));
        assert!(body.collect().await.is_err());

        let masker = no_masks();
        let capture = prefix.into_capture(64, &masker.select(&Method::GET, "/"), None);
        match capture {
            BodyCapture::Unavailable { reason } => assert!(reason.contains("connection reset")),
            other => panic!("unexpected capture: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stalled_body_times_out() {
        let stalled = stream::once(async { Ok::<_, std::io::Error>(Bytes::from_static(b"tick")) })
            .chain(stream::pending());
        let (_, prefix) = read_body_prefix(
            Body::from_stream(stalled),
            1024,
            Duration::from_millis(20),
        )
        .await;
        assert!(matches!(prefix.state(), PrefixState::TimedOut(_)));
        assert_eq!(prefix.bytes_read(), 4);
    }

    #[tokio::test]
    async fn test_masked_snippet_respects_cap() {
        let masker = Masker::compile(&[MaskRule::new("/**").query_param("a")]).unwrap();
        let (_, prefix) = read_body_prefix(Body::from("a=1"), 3, TIMEOUT).await;
        let capture = prefix.into_capture(
            3,
            &masker.select(&Method::POST, "/login"),
            Some("application/x-www-form-urlencoded"),
        );
        // "a=*****" is cut back to the cap
        assert_eq!(capture.snippet(), Some("a=*"));
        assert!(!capture.is_truncated());
    }

    #[tokio::test]
    async fn test_cap_inside_masked_value_hides_it() {
        let masker = Masker::compile(&[MaskRule::new("/**").json_field("password")]).unwrap();
        let masks = masker.select(&Method::POST, "/login");

        let (_, prefix) = read_body_prefix(
            Body::from(r#"{"password":"supersecretvalue123"}"#),
            20,
            TIMEOUT,
        )
        .await;
        let capture = prefix.into_capture(20, &masks, Some("application/json"));
        assert_eq!(capture.snippet(), Some(r#"{"password":"*****"}"#));
        assert!(capture.is_truncated());

        // The value runs far past anything buffered
        let long = format!(r#"{{"password":"{}"}}"#, "s".repeat(4096));
        let (_, prefix) = read_body_prefix(Body::from(long), 20, TIMEOUT).await;
        let capture = prefix.into_capture(20, &masks, Some("application/json"));
        let snippet = capture.snippet().unwrap();
        assert!(!snippet.contains("sss"), "leaked: {}", snippet);
        assert!(snippet.starts_with(r#"{"password":"***"#));
    }

    #[tokio::test]
    async fn test_size_reports_known_length() {
        let (_, prefix) = read_body_prefix(Body::from(vec![b'a'; 10_000]), 100, TIMEOUT).await;
        assert_eq!(prefix.size(), 10_000);
        let masker = no_masks();
        match prefix.into_capture(100, &masker.select(&Method::POST, "/"), None) {
            BodyCapture::Captured { size, truncated, .. } => {
                assert_eq!(size, 10_000);
                assert!(truncated);
            }
            other => panic!("unexpected capture: {:?}", other),
        }
    }
}
