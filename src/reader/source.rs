//! Byte sources feeding a [`JsonTextReader`](super::JsonTextReader)

use std::io::{ErrorKind, Read};

type IoError = std::io::Error;

/// The suspension point of the reader
///
/// All bytes enter the reader through [`read`](Self::read). A source decides the
/// execution mode:
///
/// - *Blocking*: `read` blocks until data is available and the JSON reader runs each
///   operation to completion ([`ReadSource`], [`SliceSource`]).
/// - *Suspend-capable*: `read` fails with [`ErrorKind::WouldBlock`] when no data is
///   available right now. The JSON reader then returns
///   [`ReaderError::Incomplete`](super::ReaderError::Incomplete) without losing any
///   state, and the host retries the same operation later. Both modes produce
///   token-for-token identical results for the same input, including identical
///   error positions.
pub trait ByteSource {
    /// Reads more bytes into `buf`
    ///
    /// Returns the number of bytes read; `Ok(0)` means the end of the input has been
    /// reached. May fill the buffer only partially, with arbitrarily small chunks;
    /// the JSON reader reassembles tokens which straddle chunk boundaries.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError>;
}

/// A [`ByteSource`] over an in-memory byte slice
///
/// The whole input is available up front, so this source never blocks.
#[derive(Debug)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Creates a source reading from the given bytes
    pub fn new(data: &'a [u8]) -> Self {
        SliceSource { data, pos: 0 }
    }
}

impl ByteSource for SliceSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let count = buf.len().min(self.data.len() - self.pos);
        buf[..count].copy_from_slice(&self.data[self.pos..self.pos + count]);
        self.pos += count;
        Ok(count)
    }
}

/// A blocking [`ByteSource`] wrapping a [`Read`]
///
/// If the underlying reader returns an error of kind [`ErrorKind::Interrupted`],
/// this source will keep retrying to read data.
#[derive(Debug)]
pub struct ReadSource<R: Read> {
    reader: R,
}

impl<R: Read> ReadSource<R> {
    /// Creates a source reading from the given reader
    ///
    /// The JSON reader buffers data internally so it is normally not necessary to
    /// wrap the reader in a [`std::io::BufReader`].
    pub fn new(reader: R) -> Self {
        ReadSource { reader }
    }

    /// Unwraps the inner reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        loop {
            match self.reader.read(buf) {
                // Retry if interrupted
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_source() {
        let mut source = SliceSource::new(b"abc");
        let mut buf = [0_u8; 2];
        assert_eq!(2, source.read(&mut buf).unwrap());
        assert_eq!(b"ab", &buf);
        assert_eq!(1, source.read(&mut buf).unwrap());
        assert_eq!(b'c', buf[0]);
        assert_eq!(0, source.read(&mut buf).unwrap());
    }

    #[test]
    fn read_source_retries_interrupted() {
        struct InterruptedOnce {
            interrupted: bool,
        }
        impl Read for InterruptedOnce {
            fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
                if self.interrupted {
                    buf[0] = b'x';
                    Ok(1)
                } else {
                    self.interrupted = true;
                    Err(IoError::new(ErrorKind::Interrupted, "interrupted"))
                }
            }
        }

        let mut source = ReadSource::new(InterruptedOnce { interrupted: false });
        let mut buf = [0_u8; 4];
        assert_eq!(1, source.read(&mut buf).unwrap());
        assert_eq!(b'x', buf[0]);
    }
}
