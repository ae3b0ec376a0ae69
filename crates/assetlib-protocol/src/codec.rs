//! JSON Lines framing for [`Message`] values.
//!
//! Each message occupies one line. Readers are bounded so a peer cannot make
//! the other side buffer an unterminated line forever.

use std::io::{self, BufRead, Read, Write};

use thiserror::Error;

use crate::message::Message;

/// Maximum size of a single encoded message in bytes.
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Errors surfaced while framing or parsing messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The line could not be parsed as a message.
    #[error("malformed message: {message}")]
    Malformed {
        /// Parser diagnostic.
        message: String,
        /// Underlying JSON error, when one exists.
        #[source]
        source: Option<serde_json::Error>,
    },
    /// A line exceeded [`MAX_MESSAGE_BYTES`].
    #[error("message too large: {size} bytes exceeds {max_size} byte limit")]
    TooLarge {
        /// Bytes read before giving up.
        size: usize,
        /// Configured limit.
        max_size: usize,
    },
    /// Serialising an outgoing message failed.
    #[error("failed to serialise message: {0}")]
    Serialise(#[source] serde_json::Error),
    /// Reading or writing the underlying stream failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Whether the stream can keep going after this error.
    ///
    /// A malformed line has been consumed completely, so the next line can
    /// still be read. Oversized lines and IO failures leave the stream in an
    /// unknown position.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }
}

/// Serialises a message into one newline-terminated line.
///
/// # Errors
///
/// Returns [`CodecError::Serialise`] if the message cannot be encoded.
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    let mut line = serde_json::to_vec(message).map_err(CodecError::Serialise)?;
    line.push(b'\n');
    Ok(line)
}

/// Parses one line into a message, ignoring trailing whitespace.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] for empty input or invalid JSON.
pub fn decode(line: &[u8]) -> Result<Message, CodecError> {
    let trimmed = trim_trailing_whitespace(line);
    if trimmed.is_empty() {
        return Err(CodecError::malformed("empty message line"));
    }
    serde_json::from_slice(trimmed).map_err(|source| CodecError::Malformed {
        message: source.to_string(),
        source: Some(source),
    })
}

/// Writes a message as a JSON line and flushes the writer.
///
/// # Errors
///
/// Returns an error if serialisation, writing, or flushing fails.
pub fn write_message<W>(writer: &mut W, message: &Message) -> Result<(), CodecError>
where
    W: Write + ?Sized,
{
    let line = encode(message)?;
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}

/// Reads one raw line, bounded by [`MAX_MESSAGE_BYTES`].
///
/// Returns `Ok(None)` when the stream ends before any byte is read. A final
/// line without a newline is returned as-is.
///
/// # Errors
///
/// Returns [`CodecError::TooLarge`] when the line exceeds the limit and
/// [`CodecError::Io`] when reading fails.
pub fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, CodecError>
where
    R: BufRead + ?Sized,
{
    let budget = u64::try_from(MAX_MESSAGE_BYTES)
        .unwrap_or(u64::MAX)
        .saturating_add(1);
    let mut line = Vec::new();
    let read = reader.take(budget).read_until(b'\n', &mut line)?;
    if read == 0 {
        return Ok(None);
    }
    if line.len() > MAX_MESSAGE_BYTES {
        return Err(CodecError::TooLarge {
            size: line.len(),
            max_size: MAX_MESSAGE_BYTES,
        });
    }
    Ok(Some(line))
}

/// Reads and parses the next message.
///
/// # Errors
///
/// See [`read_frame`] and [`decode`].
pub fn read_message<R>(reader: &mut R) -> Result<Option<Message>, CodecError>
where
    R: BufRead + ?Sized,
{
    read_frame(reader)?.map(|line| decode(&line)).transpose()
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(0, |position| position.saturating_add(1));
    bytes.get(..end).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde_json::json;

    use super::*;
    use crate::message::Status;

    #[test]
    fn encodes_single_line() {
        let line = encode(&Message::request("import").with_id("tcp://host:6002"))
            .expect("encode request");
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|byte| **byte == b'\n').count(), 1);
    }

    #[test]
    fn decodes_with_trailing_whitespace() {
        let message = decode(b"{\"status\":\"ok\"}  \r\n").expect("decode");
        assert_eq!(message.status, Some(Status::Ok));
    }

    #[test]
    fn rejects_empty_and_invalid_lines() {
        assert!(matches!(decode(b"   \n"), Err(CodecError::Malformed { .. })));
        let error = decode(b"not json").expect_err("invalid json");
        assert!(error.is_recoverable());
    }

    #[test]
    fn reads_consecutive_messages_from_one_stream() {
        let mut stream = Vec::new();
        write_message(&mut stream, &Message::request("time")).expect("write first");
        write_message(&mut stream, &Message::ok().with_result(json!("t"))).expect("write second");
        let mut reader = Cursor::new(stream);

        let first = read_message(&mut reader).expect("read first");
        let second = read_message(&mut reader).expect("read second");
        let end = read_message(&mut reader).expect("read end");

        assert_eq!(first.and_then(|m| m.command), Some("time".to_owned()));
        assert_eq!(second.and_then(|m| m.result), Some(json!("t")));
        assert!(end.is_none());
    }

    #[test]
    fn rejects_oversized_lines() {
        let mut payload = vec![b'a'; MAX_MESSAGE_BYTES.saturating_add(16)];
        payload.push(b'\n');
        let mut reader = Cursor::new(payload);
        let error = read_frame(&mut reader).expect_err("line too large");
        assert!(matches!(error, CodecError::TooLarge { .. }));
        assert!(!error.is_recoverable());
    }
}
