use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

const BUFFER_SIZE: usize = 1 << 16;

pub fn is_gzipped(header: &[u8]) -> bool {
    header.starts_with(b"\x1f\x8b")
}

/// Split a trailing `.gz` off a path, reporting whether there was one
pub fn is_gzipped_extension(path: PathBuf) -> (bool, PathBuf) {
    if let Some(ext) = path.extension() {
        if ext.eq_ignore_ascii_case("gz") {
            (true, path.with_extension(""))
        } else {
            (false, path)
        }
    } else {
        (false, path)
    }
}

/**
The final destination of a serialized document.

Writers never know whether they are writing into a gzip stream, which is how
byte offsets they record always refer to the uncompressed document.
*/
pub enum OutputSink {
    Plain(BufWriter<fs::File>),
    Gzip(GzEncoder<BufWriter<fs::File>>),
    Stdout(io::Stdout),
}

impl OutputSink {
    pub fn create<P: AsRef<Path>>(path: P, gzip: bool) -> io::Result<Self> {
        let handle = BufWriter::with_capacity(BUFFER_SIZE, fs::File::create(path)?);
        if gzip {
            Ok(Self::Gzip(GzEncoder::new(handle, Compression::default())))
        } else {
            Ok(Self::Plain(handle))
        }
    }

    pub fn stdout() -> Self {
        Self::Stdout(io::stdout())
    }

    /// Write any pending compressed trailer and flush everything to the file
    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::Plain(mut handle) => handle.flush(),
            Self::Gzip(encoder) => encoder.finish()?.flush(),
            Self::Stdout(mut handle) => handle.flush(),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(handle) => handle.write(buf),
            Self::Gzip(handle) => handle.write(buf),
            Self::Stdout(handle) => handle.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(handle) => handle.flush(),
            Self::Gzip(handle) => handle.flush(),
            Self::Stdout(handle) => handle.flush(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_gzip_extension() {
        let (gz, path) = is_gzipped_extension(PathBuf::from("out/run.mzML.GZ"));
        assert!(gz);
        assert_eq!(path, PathBuf::from("out/run.mzML"));
        let (gz, path) = is_gzipped_extension(PathBuf::from("run.mgf"));
        assert!(!gz);
        assert_eq!(path, PathBuf::from("run.mgf"));
    }

    #[test]
    fn test_gzip_sink() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test.txt.gz");
        let mut sink = OutputSink::create(&path, true)?;
        sink.write_all(b"hello world")?;
        sink.finish()?;

        let raw = fs::read(&path)?;
        assert!(is_gzipped(&raw));
        let mut text = String::new();
        GzDecoder::new(raw.as_slice()).read_to_string(&mut text)?;
        assert_eq!(text, "hello world");
        Ok(())
    }
}
