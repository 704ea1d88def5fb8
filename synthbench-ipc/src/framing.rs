//! Length-Prefixed Frame Encoding
//!
//! Message boundaries over the worker's command and reply pipes.

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{BufReader, BufWriter, Read, Write};
use thiserror::Error;

/// Maximum frame size (16 MB); large arrays of inputs still fit comfortably
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Errors that can occur during frame encoding/decoding
#[derive(Debug, Error)]
pub enum FrameError {
    /// Pipe failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// rkyv could not serialize the message
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The payload failed validation
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Length prefix exceeds [`MAX_FRAME_SIZE`]
    #[error("Frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge {
        /// Announced size
        size: usize,
        /// Limit
        max: usize,
    },

    /// Malformed frame header
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The peer closed the pipe between frames
    #[error("End of stream")]
    EndOfStream,
}

/// Write a message with length prefix to a writer
///
/// Frame format:
/// ```text
/// +----------------+------------------+
/// | length (4 LE)  | rkyv payload     |
/// +----------------+------------------+
/// ```
pub fn write_frame<W, T>(writer: &mut BufWriter<W>, message: &T) -> Result<(), FrameError>
where
    W: Write,
    T: Serialize<AllocSerializer<256>>,
{
    let bytes =
        rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Serialization(e.to_string()))?;

    let len = bytes.len();
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(len as u32).to_le_bytes())?;
    writer.write_all(&bytes)?;
    // The peer blocks on this frame; nothing else will flush it.
    writer.flush()?;

    Ok(())
}

/// Read a message with length prefix from a reader
pub fn read_frame<R, T>(reader: &mut BufReader<R>) -> Result<T, FrameError>
where
    R: Read,
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::EndOfStream);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }

    if len == 0 {
        return Err(FrameError::InvalidFrame("zero-length frame".to_string()));
    }

    let mut buf = rkyv::AlignedVec::with_capacity(len);
    buf.resize(len, 0);
    reader.read_exact(&mut buf)?;

    // Frames come from a process running untrusted native code: validate before use.
    let archived = rkyv::check_archived_root::<T>(&buf)
        .map_err(|e| FrameError::Deserialization(e.to_string()))?;

    archived
        .deserialize(&mut Infallible)
        .map_err(|e| FrameError::Deserialization(format!("{e:?}")))
}

/// Frame writer wrapper for convenient message sending
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Create a new frame writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(64 * 1024, writer),
        }
    }

    /// Write a message
    pub fn write<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        write_frame(&mut self.writer, message)
    }
}

/// Frame reader wrapper for convenient message receiving
pub struct FrameReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Create a new frame reader
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(64 * 1024, reader),
        }
    }

    /// Read a message
    pub fn read<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        read_frame(&mut self.reader)
    }

    /// Check if the buffer has any data available
    pub fn has_buffered_data(&self) -> bool {
        !self.reader.buffer().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
    use std::io::Cursor;

    #[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize)]
    #[archive(check_bytes)]
    struct Probe {
        id: u32,
        label: String,
    }

    #[test]
    fn test_multiple_messages() {
        let probes: Vec<Probe> = (0..3)
            .map(|id| Probe {
                id,
                label: format!("probe-{id}"),
            })
            .collect();

        let mut buffer = Vec::new();
        {
            let mut writer = FrameWriter::new(&mut buffer);
            for probe in &probes {
                writer.write(probe).unwrap();
            }
        }

        let mut reader = FrameReader::new(Cursor::new(buffer));
        for expected in &probes {
            let decoded: Probe = reader.read().unwrap();
            assert_eq!(expected, &decoded);
        }
        let result: Result<Probe, _> = reader.read();
        assert!(matches!(result, Err(FrameError::EndOfStream)));
    }

    #[test]
    fn test_oversized_prefix_rejected() {
        let buffer = ((MAX_FRAME_SIZE + 1) as u32).to_le_bytes().to_vec();
        let mut reader = FrameReader::new(Cursor::new(buffer));
        let result: Result<Probe, _> = reader.read();
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_zero_length_frame() {
        let buffer = 0u32.to_le_bytes().to_vec();
        let mut reader = FrameReader::new(Cursor::new(buffer));
        let result: Result<Probe, _> = reader.read();
        assert!(matches!(result, Err(FrameError::InvalidFrame(_))));
    }

    #[test]
    fn test_garbage_payload_rejected() {
        let mut buffer = 8u32.to_le_bytes().to_vec();
        buffer.extend_from_slice(&[0xff; 8]);
        let mut reader = FrameReader::new(Cursor::new(buffer));
        let result: Result<Probe, _> = reader.read();
        assert!(result.is_err());
    }
}
