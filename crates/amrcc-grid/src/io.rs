// crates/amrcc-grid/src/io.rs

//! Grid-file read/write with extension-based auto-detection.
//!
//! `.json` and `.cbor` are supported; unknown or missing extensions are
//! rejected for reads and default to JSON for writes.

use crate::format::GridFile;
use anyhow::{anyhow, bail, Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Read a grid file from **JSON**.
pub fn read_grid_json<P: AsRef<Path>>(path: P) -> Result<GridFile> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let v: GridFile =
        serde_json::from_reader(BufReader::new(f)).context("deserialize JSON grid file")?;
    Ok(v)
}

/// Write a grid file to **JSON** (pretty).
pub fn write_grid_json<P: AsRef<Path>>(path: P, v: &GridFile) -> Result<()> {
    let path = path.as_ref();
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(f), v).context("serialize JSON grid file")?;
    Ok(())
}

/// Read a grid file from **CBOR**.
pub fn read_grid_cbor<P: AsRef<Path>>(path: P) -> Result<GridFile> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let v: GridFile =
        ciborium::de::from_reader(BufReader::new(f)).context("deserialize CBOR grid file")?;
    Ok(v)
}

/// Write a grid file to **CBOR**.
pub fn write_grid_cbor<P: AsRef<Path>>(path: P, v: &GridFile) -> Result<()> {
    let path = path.as_ref();
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    ciborium::ser::into_writer(v, BufWriter::new(f)).context("serialize CBOR grid file")?;
    Ok(())
}

/// Auto-detect read by extension, with a version check.
pub fn read_grid_auto<P: AsRef<Path>>(path: P) -> Result<GridFile> {
    let v = match ext_lower(path.as_ref()).as_deref() {
        Some("json") => read_grid_json(path),
        Some("cbor") => read_grid_cbor(path),
        Some(other) => Err(anyhow!(
            "unsupported grid extension: {other} (supported: .json, .cbor)"
        )),
        None => Err(anyhow!("path has no extension (expected .json or .cbor)")),
    }?;
    if v.version != crate::format::GRID_FILE_VERSION {
        bail!(
            "unsupported grid file version {} (expected {})",
            v.version,
            crate::format::GRID_FILE_VERSION
        );
    }
    Ok(v)
}

/// Auto-detect write (defaults to **JSON** if unknown or missing).
pub fn write_grid_auto<P: AsRef<Path>>(path: P, v: &GridFile) -> Result<()> {
    match ext_lower(path.as_ref()).as_deref() {
        Some("cbor") => write_grid_cbor(path, v),
        _ => write_grid_json(path, v),
    }
}

fn ext_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::gaussian_grid_file;

    #[test]
    fn grid_files_round_trip_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let file = gaussian_grid_file([4, 4, 4], 1.5);

        for ext in ["json", "cbor"] {
            let path = dir.path().join(format!("grid.{ext}"));
            write_grid_auto(&path, &file).unwrap();
            let back = read_grid_auto(&path).unwrap();
            assert_eq!(back.shape, file.shape);
            assert_eq!(back.fields[0].values, file.fields[0].values);
        }
    }

    #[test]
    fn unknown_extension_is_rejected_on_read() {
        assert!(read_grid_auto("grid.npy").is_err());
    }
}
