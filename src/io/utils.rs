use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use sha1::{Digest, Sha1};

/// A writable stream that keeps a running SHA-1 checksum of all bytes and
/// counts how many have been written
#[derive(Clone)]
pub struct ChecksumStream<T: io::Write> {
    stream: T,
    context: Sha1,
    bytes_written: u64,
}

impl<T: io::Write> ChecksumStream<T> {
    pub fn new(stream: T) -> ChecksumStream<T> {
        Self {
            stream,
            context: Sha1::new(),
            bytes_written: 0,
        }
    }

    /// The hex digest of every byte written so far
    pub fn compute(&self) -> String {
        let digest = self.context.clone().finalize();
        base16ct::lower::encode_string(&digest)
    }

    /// The number of bytes accepted so far, including any still held in
    /// buffers further down the stream
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: io::Write> io::Write for ChecksumStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(buf)?;
        self.context.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Compute the SHA-1 hex digest of a file's contents
pub fn checksum_file<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut handle = io::BufReader::new(fs::File::open(path)?);
    let mut context = Sha1::new();
    let mut buffer = vec![0u8; 1 << 16];
    loop {
        let n = handle.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.update(&buffer[..n]);
    }
    Ok(base16ct::lower::encode_string(&context.finalize()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_checksum_stream() -> io::Result<()> {
        let mut stream = ChecksumStream::new(Vec::new());
        stream.write_all(b"foo")?;
        stream.write_all(b"bar")?;
        assert_eq!(stream.bytes_written(), 6);
        assert_eq!(stream.compute(), "8843d7f92416211de9ebb963ff4ce28125932878");
        assert_eq!(stream.into_inner(), b"foobar");
        Ok(())
    }

    #[test]
    fn test_checksum_file() -> io::Result<()> {
        let mut handle = tempfile::NamedTempFile::new()?;
        handle.write_all(b"foobar")?;
        handle.flush()?;
        assert_eq!(
            checksum_file(handle.path())?,
            "8843d7f92416211de9ebb963ff4ce28125932878"
        );
        Ok(())
    }
}
