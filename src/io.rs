//! Channel I/O - reading and writing frames over byte streams
//!
//! [`FrameReader`] and [`FrameWriter`] wrap the process's stdin/stdout (or any
//! `Read`/`Write` pair in tests) and move whole frames through the codec in
//! [`crate::frame`].
//!
//! End of stream is reported as `Ok(None)` and only when the stream closes
//! before the first byte of a length prefix. A stream that closes anywhere
//! inside a frame yields [`FrameError::UnexpectedEof`].

use crate::frame::{self, FrameError, Limits, Message, LENGTH_PREFIX_SIZE};
use serde::Serialize;
use std::io::{self, Read, Write};

/// Read one frame from a reader.
///
/// Returns Ok(None) on clean EOF, Err(UnexpectedEof) on partial read.
pub fn read_frame<R: Read>(reader: &mut R, limits: &Limits) -> Result<Option<Message>, FrameError> {
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    match fill(reader, &mut len_buf)? {
        0 => return Ok(None),
        LENGTH_PREFIX_SIZE => {}
        _ => return Err(FrameError::UnexpectedEof),
    }

    let length = frame::decode_length(&len_buf)?;

    if length as usize > limits.max_incoming {
        return Err(FrameError::TooLarge {
            size: length as usize,
            max: limits.max_incoming,
        });
    }

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::UnexpectedEof
        } else {
            FrameError::Io(e)
        }
    })?;

    frame::decode_body(&body, length).map(Some)
}

/// Write one frame to a writer and flush it.
///
/// Prefix and body go out in a single `write_all` so the peer never observes
/// a prefix without its body from this side.
pub fn write_frame<W: Write, T: Serialize + ?Sized>(
    writer: &mut W,
    message: &T,
    limits: &Limits,
) -> Result<(), FrameError> {
    let bytes = frame::encode(message, limits)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read until `buf` is full or the stream ends. Returns the number of bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Frame reader over a byte stream
#[derive(Debug)]
pub struct FrameReader<R: Read> {
    reader: R,
    limits: Limits,
}

impl<R: Read> FrameReader<R> {
    /// Create a new frame reader with default limits
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            limits: Limits::default(),
        }
    }

    /// Create a new frame reader with specified limits
    pub fn with_limits(reader: R, limits: Limits) -> Self {
        Self { reader, limits }
    }

    /// Read the next frame
    pub fn read(&mut self) -> Result<Option<Message>, FrameError> {
        read_frame(&mut self.reader, &self.limits)
    }
}

/// Frame writer over a byte stream
#[derive(Debug)]
pub struct FrameWriter<W: Write> {
    writer: W,
    limits: Limits,
}

impl<W: Write> FrameWriter<W> {
    /// Create a new frame writer with default limits
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            limits: Limits::default(),
        }
    }

    /// Create a new frame writer with specified limits
    pub fn with_limits(writer: W, limits: Limits) -> Self {
        Self { writer, limits }
    }

    /// Write a message as one frame
    pub fn write<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<(), FrameError> {
        write_frame(&mut self.writer, message, &self.limits)
    }

    /// Get mutable access to the underlying writer
    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Consume the writer, returning the underlying stream
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::io::Cursor;

    fn object(value: Value) -> Message {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {}", other),
        }
    }

    /// Reader that hands out at most one byte per call
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let end = buf.len().min(1);
            self.0.read(&mut buf[..end])
        }
    }

    /// Writer that counts flushes and records every write call
    #[derive(Default)]
    struct Recording {
        writes: Vec<Vec<u8>>,
        flushes: usize,
    }

    impl Write for Recording {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes.push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }
    }

    // TEST120: N frames written back to back are read in order, then EOF
    #[test]
    fn test120_sequential_frames_then_eof() {
        let messages: Vec<Message> = vec![
            object(json!({"action": "ping"})),
            object(json!({"action": "check_ffmpeg"})),
            object(json!({"action": "convert", "input_path": "/tmp/a.webm"})),
        ];

        let mut writer = FrameWriter::new(Vec::new());
        for m in &messages {
            writer.write(m).expect("write should succeed");
        }

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()));
        for expected in &messages {
            let got = reader.read().expect("read should succeed").expect("frame expected");
            assert_eq!(&got, expected);
        }
        assert!(reader.read().unwrap().is_none());
    }

    // TEST121: An empty stream is end of stream, not an error
    #[test]
    fn test121_empty_stream_is_eof() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert!(reader.read().unwrap().is_none());
    }

    // TEST122: A stream closing inside the prefix is a framing failure
    #[test]
    fn test122_partial_prefix_is_unexpected_eof() {
        let mut reader = FrameReader::new(Cursor::new(vec![5u8, 0]));
        assert!(matches!(reader.read(), Err(FrameError::UnexpectedEof)));
    }

    // TEST123: A stream closing inside the body is a framing failure
    #[test]
    fn test123_truncated_body_is_unexpected_eof() {
        let mut bytes = 20u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(br#"{"action":"#);
        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(reader.read(), Err(FrameError::UnexpectedEof)));
    }

    // TEST124: Reads are assembled from short reads
    #[test]
    fn test124_short_reads_are_reassembled() {
        let message = object(json!({"action": "convert", "input_path": "/x/y.webm"}));
        let mut buf = Vec::new();
        write_frame(&mut buf, &message, &Limits::default()).unwrap();

        let mut reader = FrameReader::new(Trickle(Cursor::new(buf)));
        assert_eq!(reader.read().unwrap(), Some(message));
        assert!(reader.read().unwrap().is_none());
    }

    // TEST125: Announced length above the incoming limit is rejected before allocating
    #[test]
    fn test125_oversized_length_rejected() {
        let limits = Limits {
            max_incoming: 8,
            ..Limits::default()
        };
        let mut bytes = 1000u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(&[b' '; 16]);

        let mut reader = FrameReader::with_limits(Cursor::new(bytes), limits);
        assert!(matches!(reader.read(), Err(FrameError::TooLarge { size: 1000, max: 8 })));
    }

    // TEST126: A complete frame with a bad body surfaces the decode error
    #[test]
    fn test126_bad_body_is_decode_error() {
        let body = b"not json";
        let mut bytes = (body.len() as u32).to_ne_bytes().to_vec();
        bytes.extend_from_slice(body);

        let mut reader = FrameReader::new(Cursor::new(bytes));
        assert!(matches!(reader.read(), Err(FrameError::Decode(_))));
    }

    // TEST127: A frame is written with a single write call and flushed
    #[test]
    fn test127_write_is_single_call_and_flushed() {
        let mut writer = FrameWriter::new(Recording::default());
        writer.write(&json!({"action": "pong"})).unwrap();

        let inner = writer.inner_mut();
        assert_eq!(inner.writes.len(), 1, "prefix and body must go out together");
        assert_eq!(inner.flushes, 1);

        let frame = &inner.writes[0];
        let length = crate::frame::decode_length(frame).unwrap() as usize;
        assert_eq!(frame.len(), LENGTH_PREFIX_SIZE + length);
    }

    // TEST128: Nothing is written when the message exceeds the outgoing limit
    #[test]
    fn test128_oversized_write_leaves_stream_untouched() {
        let limits = Limits {
            max_outgoing: 4,
            ..Limits::default()
        };
        let mut writer = FrameWriter::with_limits(Vec::new(), limits);

        assert!(matches!(writer.write(&json!({"error": "long"})), Err(FrameError::TooLarge { .. })));
        assert!(writer.into_inner().is_empty());
    }
}
