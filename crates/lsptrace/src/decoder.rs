use thiserror::Error;

use crate::message::RawMessage;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &str = "Content-Length: ";

/// Errors raised while decoding the framed stream.
///
/// All of these are recoverable: the decoder has already positioned itself
/// at the next possible header boundary when one is returned.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("header block did not contain a usable Content-Length header")]
    MissingContentLength,
    #[error("header block contained non-ASCII bytes")]
    HeaderNotAscii,
    #[error("message body was not valid JSON-RPC: {source}")]
    Body {
        #[source]
        source: serde_json::Error,
    },
}

/// Incremental decoder for `Content-Length`-framed JSON-RPC streams.
///
/// Input arrives in arbitrary slices via [`FrameDecoder::extend`]; callers
/// then drive [`FrameDecoder::decode_next`] until it reports that no whole
/// message is buffered. Bytes past the last complete message are retained
/// for the next round.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    have_header: bool,
    content_length: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk of raw stream bytes to the scan buffer.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Advances the framing state machine.
    ///
    /// Returns `Ok(Some(..))` when a whole body was consumed and parsed,
    /// `Ok(None)` when more input is needed, and an error when the current
    /// frame is unusable. After a [`FrameError::Body`] the framing state is
    /// reset so the stream resynchronizes at the next header.
    pub fn decode_next(&mut self) -> Result<Option<RawMessage>, FrameError> {
        loop {
            if !self.have_header {
                let Some(at) = find_terminator(&self.buf) else {
                    return Ok(None);
                };
                let header: Vec<u8> = self.buf.drain(..at + HEADER_TERMINATOR.len()).collect();
                let header = &header[..at];
                if !header.is_ascii() {
                    return Err(FrameError::HeaderNotAscii);
                }
                let Some(content_length) = parse_content_length(header) else {
                    return Err(FrameError::MissingContentLength);
                };
                self.content_length = content_length;
                self.have_header = true;
                continue;
            }

            if self.buf.len() < self.content_length {
                return Ok(None);
            }
            let body: Vec<u8> = self.buf.drain(..self.content_length).collect();
            self.have_header = false;
            self.content_length = 0;
            return match serde_json::from_slice(&body) {
                Ok(message) => Ok(Some(message)),
                Err(source) => Err(FrameError::Body { source }),
            };
        }
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}

fn parse_content_length(header: &[u8]) -> Option<usize> {
    let text = String::from_utf8_lossy(header);
    let mut content_length = 0usize;
    for line in text.split("\r\n") {
        // Matched as a substring: some servers have been seen to prepend
        // stray bytes before the header name.
        if let Some(at) = line.find(CONTENT_LENGTH) {
            if let Ok(length) = line[at + CONTENT_LENGTH.len()..].trim().parse() {
                content_length = length;
            }
        }
    }
    (content_length > 0).then_some(content_length)
}
