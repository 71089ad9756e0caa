use crate::error::{NetError, NetResult};

use super::protocol::{BUFFER_LENGTH, HEADER_LEN};

/// Anything that can hand over already-arrived bytes without blocking.
///
/// `Ok(0)` means nothing is available right now.
pub trait ByteSource {
    fn recv(&mut self, buf: &mut [u8]) -> NetResult<usize>;
}

/// Reassembles length-prefixed messages from a byte stream.
///
/// At most one complete message is produced per call to `poll`.
#[derive(Debug)]
pub struct FrameReader {
    buffer: [u8; BUFFER_LENGTH],
    received: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReader {
    pub fn new() -> Self {
        Self {
            buffer: [0; BUFFER_LENGTH],
            received: 0,
        }
    }

    pub fn reset(&mut self) {
        self.received = 0;
    }

    pub fn is_idle(&self) -> bool {
        self.received == 0
    }

    pub fn poll<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> NetResult<Option<Vec<u8>>> {
        if self.received == 0 {
            let n = source.recv(&mut self.buffer[..1])?;
            if n == 0 {
                return Ok(None);
            }
            self.received = 1;
        }

        let declared = self.buffer[0] as usize;
        if declared < HEADER_LEN {
            self.received = 0;
            return Err(NetError::Data(format!(
                "declared message length {} is too short",
                declared
            )));
        }

        if self.received < declared {
            let n = source.recv(&mut self.buffer[self.received..declared])?;
            self.received += n;
        }

        if self.received < declared {
            return Ok(None);
        }

        let frame = self.buffer[..declared].to_vec();
        self.received = 0;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    struct Trickle {
        chunks: VecDeque<Vec<u8>>,
    }

    impl Trickle {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            }
        }
    }

    impl ByteSource for Trickle {
        fn recv(&mut self, buf: &mut [u8]) -> NetResult<usize> {
            let Some(chunk) = self.chunks.front_mut() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            chunk.drain(..n);
            if chunk.is_empty() {
                self.chunks.pop_front();
            }
            Ok(n)
        }
    }

    #[test]
    fn test_partial_frames_are_assembled() {
        let mut source = Trickle::new(&[&[6, 0x04], &[], &[0, 12], &[0, 7, 3, 0x02, 5]]);
        let mut reader = FrameReader::new();

        let mut frames = Vec::new();
        for _ in 0..10 {
            if let Some(frame) = reader.poll(&mut source).unwrap() {
                frames.push(frame);
            }
        }

        assert_eq!(frames, vec![vec![6, 0x04, 0, 12, 0, 7], vec![3, 0x02, 5]]);
        assert!(reader.is_idle());
    }

    #[test]
    fn test_one_frame_per_poll() {
        let mut source = Trickle::new(&[&[3, 0x05, 0, 3, 0x05, 1]]);
        let mut reader = FrameReader::new();

        assert_eq!(reader.poll(&mut source).unwrap(), Some(vec![3, 0x05, 0]));
        assert_eq!(reader.poll(&mut source).unwrap(), Some(vec![3, 0x05, 1]));
        assert_eq!(reader.poll(&mut source).unwrap(), None);
    }

    #[test]
    fn test_nothing_available() {
        let mut source = Trickle::new(&[]);
        let mut reader = FrameReader::new();
        assert_eq!(reader.poll(&mut source).unwrap(), None);
        assert!(reader.is_idle());
    }

    #[test]
    fn test_short_declared_length_is_rejected() {
        let mut source = Trickle::new(&[&[1, 0x00]]);
        let mut reader = FrameReader::new();
        assert!(matches!(reader.poll(&mut source), Err(NetError::Data(_))));
    }
}
