use super::SimpleResult;
use super::progress::*;
use crc32fast::Hasher;
use digest::generic_array::GenericArray;
use digest::generic_array::typenum::U4;
use digest::{Digest, FixedOutput, HashMarker, OutputSizeUser, Reset, Update};
use indicatif::ProgressBar;
use sha1::Sha1;
use std::io;
use std::path::Path;

#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }
}

impl HashMarker for Crc32 {}

impl OutputSizeUser for Crc32 {
    type OutputSize = U4;
}

impl FixedOutput for Crc32 {
    fn finalize_into(self, out: &mut GenericArray<u8, U4>) {
        out.copy_from_slice(&self.hasher.finalize().to_be_bytes());
    }
}

impl Update for Crc32 {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }
}

impl Reset for Crc32 {
    fn reset(&mut self) {
        self.hasher.reset();
    }
}

impl io::Write for Crc32 {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Update::update(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileHashes {
    pub size: u64,
    pub sha1: String,
    pub crc32: String,
}

struct DualWriter {
    sha1: Sha1,
    crc32: Crc32,
}

impl io::Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Digest::update(&mut self.sha1, buf);
        Update::update(&mut self.crc32, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Stream a file once and compute its size, SHA-1 and CRC32.
pub fn get_file_hashes<P: AsRef<Path>>(
    progress_bar: &ProgressBar,
    path: &P,
    position: usize,
    total: usize,
) -> SimpleResult<FileHashes> {
    let mut file = try_with!(
        std::fs::File::open(path.as_ref()),
        "Failed to open \"{:?}\"",
        path.as_ref()
    );
    let size = try_with!(
        file.metadata(),
        "Failed to read metadata for \"{:?}\"",
        path.as_ref()
    )
    .len();

    progress_bar.reset();
    progress_bar.set_message(format!("Computing checksums ({}/{})", position, total));
    progress_bar.set_style(get_bytes_progress_style());
    progress_bar.set_length(size);

    let mut writer = DualWriter {
        sha1: Sha1::new(),
        crc32: Crc32::new(),
    };
    try_with!(
        io::copy(&mut file, &mut progress_bar.wrap_write(&mut writer)),
        "Failed to copy data"
    );
    let sha1 = format!("{:040x}", writer.sha1.finalize()).to_lowercase();
    let mut crc_bytes = GenericArray::<u8, U4>::default();
    FixedOutput::finalize_into(writer.crc32, &mut crc_bytes);
    let crc32 = crc_bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();

    progress_bar.set_message("");
    progress_bar.set_style(get_none_progress_style());

    Ok(FileHashes { size, sha1, crc32 })
}
