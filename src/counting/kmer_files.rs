//! Binary k-mer count files: little-endian `(u64 key, u16 count)` records
//! with canonical keys. Corruption of the record stream is fatal.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::error::PipelineError;

const RECORD_BYTES: usize = 10;

/// Streaming reader over the records of one count file.
pub struct KmerFileReader {
    reader: BufReader<File>,
    path: PathBuf,
    records_read: u64,
}

impl KmerFileReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| PipelineError::io(&path, e))?;
        Ok(Self {
            reader: BufReader::new(file),
            path,
            records_read: 0,
        })
    }

    /// Reads one full record, distinguishing clean end of stream from a
    /// partial trailing record.
    fn read_record(&mut self) -> Result<Option<(u64, u16)>> {
        let mut buf = [0u8; RECORD_BYTES];
        let mut filled = 0;
        while filled < RECORD_BYTES {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PipelineError::io(&self.path, e).into()),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < RECORD_BYTES {
            return Err(PipelineError::io(
                &self.path,
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("truncated record after {} records", self.records_read),
                ),
            )
            .into());
        }
        self.records_read += 1;
        let key = u64::from_le_bytes(buf[..8].try_into().unwrap());
        let count = u16::from_le_bytes(buf[8..].try_into().unwrap());
        Ok(Some((key, count)))
    }
}

impl Iterator for KmerFileReader {
    type Item = Result<(u64, u16)>;

    fn next(&mut self) -> Option<Result<(u64, u16)>> {
        self.read_record().transpose()
    }
}

/// Writes records in iteration order.
pub fn write_kmer_counts<P, I>(path: P, records: I) -> Result<()>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (u64, u16)>,
{
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for (key, count) in records {
        writer.write_all(&key.to_le_bytes())?;
        writer.write_all(&count.to_le_bytes())?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing k-mer counts to {}", path.display()))?;
    Ok(())
}
