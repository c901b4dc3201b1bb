//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};

/// Whether a path looks gzip-compressed by its extension.
fn is_gz<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Open an input table for reading, decompressing `.gz` transparently.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())
        .map_err(|e| anyhow::anyhow!("cannot open {:?} for reading: {}", path.as_ref(), e))?;
    if is_gz(path.as_ref()) {
        tracing::trace!("reading {:?} through a gzip decoder", path.as_ref());
        let decoder = MultiGzDecoder::new(BufReader::new(file));
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("reading {:?} uncompressed", path.as_ref());
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Open an output table for writing, compressing to `.gz` transparently.
pub fn open_write_maybe_gz<P>(path: P) -> Result<Box<dyn Write>, anyhow::Error>
where
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())
        .map_err(|e| anyhow::anyhow!("cannot open {:?} for writing: {}", path.as_ref(), e))?;
    if is_gz(path.as_ref()) {
        tracing::trace!("writing {:?} through a gzip encoder", path.as_ref());
        Ok(Box::new(GzEncoder::new(
            BufWriter::new(file),
            Compression::default(),
        )))
    } else {
        tracing::trace!("writing {:?} uncompressed", path.as_ref());
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Write `bytes` to `path` atomically (write-then-rename).
///
/// A cancelled or failed task must leave no partial artifact at its final
/// location, so all artifact writers funnel through this helper.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), anyhow::Error> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent directory for {:?}", path))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| anyhow::anyhow!("cannot persist {:?}: {}", path, e))?;
    Ok(())
}
