/// Output writers for the pipeline flows: unitig FASTA, the frequency
/// distribution, per-unitig summaries, and feature vectors.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::core::unitig::Unitig;
use crate::counting::histogram::FrequencyHistogram;

/// Streaming FASTA writer for emitted unitigs.
///
/// Each record is a header carrying the path statistics followed by the
/// DNA on a single line; ids are assigned in emission order starting at 1.
pub struct UnitigFastaWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    next_id: u64,
}

impl UnitigFastaWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("failed to create FASTA file: {}", path.display()))?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            next_id: 1,
        })
    }

    /// Appends one unitig and returns its assigned id.
    pub fn append(&mut self, unitig: &Unitig) -> Result<u64> {
        let id = self.next_id;
        self.next_id += 1;
        writeln!(
            self.writer,
            ">{} length={} sum_weight={} min_weight={} max_weight={}",
            id,
            unitig.len(),
            unitig.sum_weight,
            unitig.min_weight,
            unitig.max_weight
        )?;
        writeln!(self.writer, "{}", unitig.sequence)?;
        Ok(id)
    }

    /// Flushes and reports how many records were written.
    pub fn finish(mut self) -> Result<u64> {
        self.writer
            .flush()
            .with_context(|| format!("flushing FASTA file: {}", self.path.display()))?;
        let written = self.next_id - 1;
        info!("wrote {} unitigs to {}", written, self.path.display());
        Ok(written)
    }
}

/// Writes the k-mer frequency distribution: one `i count` line per
/// frequency bucket from 1 upward.
pub fn write_distribution<P: AsRef<Path>>(
    histogram: &FrequencyHistogram,
    output_path: P,
) -> Result<()> {
    let path = output_path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("failed to create distribution file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for (i, count) in histogram.counts.iter().enumerate().skip(1) {
        writeln!(writer, "{} {}", i, count)?;
    }

    writer.flush()?;
    info!("wrote k-mer distribution to {}", path.display());
    Ok(())
}

/// Writes one `length weight` line per unitig, in emission order. The
/// weight is the mean k-mer count over the path.
pub fn write_seq_info<P: AsRef<Path>>(
    records: &[(usize, u64)],
    output_path: P,
) -> Result<()> {
    let path = output_path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("failed to create seq-info file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for (length, weight) in records {
        writeln!(writer, "{} {}", length, weight)?;
    }

    writer.flush()?;
    info!("wrote {} unitig summaries to {}", records.len(), path.display());
    Ok(())
}

/// Writes a feature vector: one normalized decimal per line, component
/// order preserved.
pub fn write_vector<P: AsRef<Path>>(
    vector: &[u64],
    normalizer: f64,
    output_path: P,
) -> Result<()> {
    let path = output_path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("failed to create vector file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    for &slot in vector {
        writeln!(writer, "{}", slot as f64 / normalizer)?;
    }

    writer.flush()?;
    info!(
        "wrote {} feature values to {}",
        vector.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::histogram::STAT_LEN;

    #[test]
    fn test_fasta_output_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sequences.fasta");
        let mut writer = UnitigFastaWriter::create(&path).unwrap();
        let unitig = Unitig {
            sequence: "AACCGGTT".to_string(),
            sum_weight: 8,
            min_weight: 1,
            max_weight: 2,
        };
        assert_eq!(writer.append(&unitig).unwrap(), 1);
        assert_eq!(writer.append(&unitig).unwrap(), 2);
        assert_eq!(writer.finish().unwrap(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            ">1 length=8 sum_weight=8 min_weight=1 max_weight=2"
        );
        assert_eq!(lines[1], "AACCGGTT");
        assert!(lines[2].starts_with(">2 "));
    }

    #[test]
    fn test_distribution_lines() {
        let mut counts = vec![0u64; STAT_LEN];
        counts[1] = 10;
        counts[2] = 3;
        let histogram = FrequencyHistogram {
            counts,
            total_kmers: 16,
            distinct_kmers: 13,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distribution");
        write_distribution(&histogram, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), STAT_LEN - 1);
        assert_eq!(lines[0], "1 10");
        assert_eq!(lines[1], "2 3");
        assert_eq!(lines[2], "3 0");
    }

    #[test]
    fn test_seq_info_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seq-info");
        write_seq_info(&[(8, 1), (120, 17)], &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "8 1\n120 17\n");
    }

    #[test]
    fn test_vector_normalization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.vec");
        write_vector(&[4, 4, 0], 8.0, &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0.5\n0.5\n0\n");
    }
}
