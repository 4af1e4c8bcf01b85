//! Naming and persistence helpers shared by the environment, the Q-table and the loops.
use anyhow::{anyhow, Context, Result};
use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

/// Formats a number of steps with a thousands suffix.
///
/// Multiples of one million get `M`, multiples of one thousand get `k`,
/// anything else is printed verbatim.
///
/// ```rust
/// use rlfolio_core::util::format_thousands;
///
/// assert_eq!(format_thousands(1_000), "1k");
/// assert_eq!(format_thousands(2_000_000), "2M");
/// assert_eq!(format_thousands(1_500), "1500");
/// ```
pub fn format_thousands(n: usize) -> String {
    if n >= 1_000_000 && n % 1_000_000 == 0 {
        format!("{}M", n / 1_000_000)
    } else if n >= 1_000 && n % 1_000 == 0 {
        format!("{}k", n / 1_000)
    } else {
        format!("{}", n)
    }
}

/// Temporary sibling of `path` used for complete-or-nothing writes.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes a table as a deflate-compressed zip archive holding one CSV entry.
///
/// Floats are written with the shortest representation that parses back to
/// the same value. The archive is written to a temporary file and renamed,
/// so `path` is either the previous file or the complete new one.
pub fn write_csv_zip(path: &Path, header: &[String], rows: &[Vec<f64>]) -> Result<()> {
    let mut buf = vec![];
    {
        let mut wtr = csv::Writer::from_writer(&mut buf);
        wtr.write_record(header)?;
        for row in rows.iter() {
            wtr.write_record(row.iter().map(|v| format!("{}", v)))?;
        }
        wtr.flush()?;
    }

    let entry = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| format!("{}.csv", s))
        .ok_or_else(|| anyhow!("invalid file name {:?}", path))?;
    let tmp = tmp_path(path);
    {
        let file = File::create(&tmp).with_context(|| format!("failed to create {:?}", tmp))?;
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(entry, options)?;
        zip.write_all(&buf)?;
        zip.finish()?;
    }
    fs::rename(&tmp, path)?;

    Ok(())
}

/// Reads a table written by [`write_csv_zip`].
pub fn read_csv_zip(path: &Path) -> Result<(Vec<String>, Vec<Vec<f64>>)> {
    let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
    let mut archive = ZipArchive::new(file)?;
    let mut content = String::new();
    archive.by_index(0)?.read_to_string(&mut content)?;

    let mut rdr = csv::Reader::from_reader(content.as_bytes());
    let header = rdr.headers()?.iter().map(String::from).collect();
    let mut rows = vec![];
    for record in rdr.records() {
        let row = record?
            .iter()
            .map(|s| s.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    Ok((header, rows))
}

/// Saves into the directory `path` through `save`, which receives a temporary sibling directory.
///
/// The temporary directory replaces `path` only after `save` succeeded.
pub fn save_dir_atomically<F>(path: &Path, save: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp = tmp_path(path);
    if tmp.exists() {
        fs::remove_dir_all(&tmp)?;
    }
    fs::create_dir_all(&tmp)?;
    save(&tmp)?;
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
