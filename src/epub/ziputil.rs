//! Typed helpers for per-entry ZIP compression methods.

use std::io::{Seek, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::Result;

/// Write a single Deflate-compressed file inside a zip archive.
pub(crate) fn write_file<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    filename: &str,
    data: &[u8],
) -> Result<()> {
    write(
        zip,
        filename,
        data,
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
    )
}

/// Similar to [`write_file`] except it uses Store instead of Deflate.
pub(crate) fn store_file<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    filename: &str,
    data: &[u8],
) -> Result<()> {
    write(
        zip,
        filename,
        data,
        SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
    )
}

fn write<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    filename: &str,
    data: &[u8],
    options: SimpleFileOptions,
) -> Result<()> {
    zip.start_file(filename, options)?;
    zip.write_all(data)?;
    Ok(())
}
