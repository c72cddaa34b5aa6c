//! Connected-component records and their binary stream format.
//!
//! A components file is a concatenation of records: a little-endian `u32`
//! k-mer count followed by that many little-endian `u64` canonical k-mers.
//! Reading and writing round-trip byte-exact.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::core::kmer::canonical;
use crate::error::PipelineError;

/// One connected subgraph of the unitig k-mer graph, supplied externally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectedComponent {
    pub kmers: Vec<u64>,
}

impl ConnectedComponent {
    pub fn new(kmers: Vec<u64>) -> Self {
        Self { kmers }
    }

    pub fn len(&self) -> usize {
        self.kmers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kmers.is_empty()
    }

    /// Canonicalizes, sorts, and deduplicates the member k-mers. Component
    /// files are expected to hold canonical keys already, but a k-mer and
    /// its reverse complement must never count twice in a feature vector.
    pub fn normalize(&mut self, k: usize) {
        for kmer in &mut self.kmers {
            *kmer = canonical(*kmer, k);
        }
        self.kmers.sort_unstable();
        self.kmers.dedup();
    }
}

/// Reads every component record until end of file.
///
/// A truncated record is a corrupt stream and fails hard; an empty file
/// yields an empty list (the caller decides whether that is an error).
pub fn read_components<P: AsRef<Path>>(path: P) -> Result<Vec<ConnectedComponent>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut components = Vec::new();

    loop {
        let mut count_buf = [0u8; 4];
        match reader.read_exact(&mut count_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(PipelineError::io(path, e).into()),
        }
        let count = u32::from_le_bytes(count_buf) as usize;
        let mut kmers = Vec::with_capacity(count);
        let mut kmer_buf = [0u8; 8];
        for _ in 0..count {
            reader.read_exact(&mut kmer_buf).with_context(|| {
                format!(
                    "components file {} truncated inside component {}",
                    path.display(),
                    components.len()
                )
            })?;
            kmers.push(u64::from_le_bytes(kmer_buf));
        }
        components.push(ConnectedComponent::new(kmers));
    }

    tracing::debug!(
        "loaded {} components from {}",
        components.len(),
        path.display()
    );
    Ok(components)
}

/// Writes components in input order.
pub fn write_components<P: AsRef<Path>>(
    path: P,
    components: &[ConnectedComponent],
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    for component in components {
        if component.len() > u32::MAX as usize {
            bail!(
                "component with {} k-mers exceeds the binary format limit",
                component.len()
            );
        }
        writer.write_all(&(component.len() as u32).to_le_bytes())?;
        for &kmer in &component.kmers {
            writer.write_all(&kmer.to_le_bytes())?;
        }
    }

    writer.flush()?;
    Ok(())
}
