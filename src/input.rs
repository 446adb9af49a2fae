use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// Buffered reader over a file or, for "-", stdin.
pub struct InputReader {
    reader: Box<dyn Read>,
}

impl InputReader {
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path = input_path.as_ref();

        let reader: Box<dyn Read> = if path.as_os_str() == "-" {
            Box::new(io::stdin().lock())
        } else {
            let file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            Box::new(BufReader::new(file))
        };

        Ok(Self { reader })
    }

    /// Read a chunk of data into the provided buffer
    /// Returns the number of bytes read, 0 indicates EOF
    pub fn read_chunk(&mut self, buffer: &mut [u8]) -> Result<usize> {
        loop {
            match self.reader.read(buffer) {
                Ok(bytes_read) => return Ok(bytes_read),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Process data in chunks using a callback function
    /// The callback receives each chunk and should return Ok(true) to continue or Ok(false) to stop
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let bytes_read = self.read_chunk(&mut buffer)?;
            if bytes_read == 0 {
                break; // EOF
            }

            if !callback(&buffer[..bytes_read])? {
                break; // Callback requested stop
            }
        }

        Ok(())
    }
}

#[test]
fn chunks_cover_file() -> Result<()> {
    let path = std::env::temp_dir().join(format!("hevcd-input-{}.bin", std::process::id()));
    let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    std::fs::write(&path, &data)?;

    let mut collected = Vec::new();
    let mut chunks = 0;
    InputReader::new(&path)?.process_chunks(4096, |chunk| {
        collected.extend_from_slice(chunk);
        chunks += 1;
        Ok(true)
    })?;
    std::fs::remove_file(&path)?;

    assert_eq!(collected, data);
    assert!(chunks >= 3);
    Ok(())
}
