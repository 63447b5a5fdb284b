use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use crate::utils::{compressed_path, remove_file_if_exists};

/// Compresses `path` into `<path>.zst` and removes the original on success.
/// On failure the original stays in place and no partial output is left.
pub fn compress_file(path: &Path) -> Result<PathBuf, std::io::Error> {
    let target = compressed_path(path);
    match encode(path, &target) {
        Ok(()) => {
            std::fs::remove_file(path)?;
            Ok(target)
        }
        Err(e) => {
            remove_file_if_exists(&target)?;
            Err(e)
        }
    }
}

fn encode(source: &Path, target: &Path) -> Result<(), std::io::Error> {
    let reader = BufReader::new(File::open(source)?);
    let mut writer = BufWriter::new(File::create(target)?);
    zstd::stream::copy_encode(reader, &mut writer, zstd::DEFAULT_COMPRESSION_LEVEL)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}
