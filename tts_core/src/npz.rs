//! Minimal reader for `.npz` archives of 2-D little-endian `f32` arrays.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use zip::ZipArchive;

const MAX_NPY_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn row(&self, index: usize) -> anyhow::Result<&[f32]> {
        if index >= self.rows {
            bail!("row index out of bounds: {index} >= {}", self.rows);
        }
        let start = index * self.cols;
        Ok(&self.data[start..start + self.cols])
    }
}

/// Load every `.npy` member of the archive, keyed by name without extension.
pub fn load(path: &Path) -> anyhow::Result<BTreeMap<String, Matrix>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open npz archive: {}", path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("failed to read npz archive: {}", path.display()))?;

    let mut arrays = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let Some(key) = name.strip_suffix(".npy") else {
            continue;
        };
        let key = key.to_string();

        let mut raw = Vec::new();
        (&mut entry)
            .take(MAX_NPY_ENTRY_BYTES + 1)
            .read_to_end(&mut raw)?;
        if raw.len() as u64 > MAX_NPY_ENTRY_BYTES {
            bail!("npy entry '{name}' exceeds {MAX_NPY_ENTRY_BYTES} bytes");
        }
        let matrix = parse_npy_f32(&raw).with_context(|| format!("failed parsing npy entry: {name}"))?;
        arrays.insert(key, matrix);
    }

    if arrays.is_empty() {
        bail!("{} does not contain any .npy entries", path.display());
    }
    Ok(arrays)
}

/// Parse a C-ordered `<f4` array. 1-D arrays are read as a single row.
pub fn parse_npy_f32(bytes: &[u8]) -> anyhow::Result<Matrix> {
    if bytes.len() < 12 || &bytes[0..6] != b"\x93NUMPY" {
        bail!("invalid npy magic header");
    }

    let (header_len, header_offset) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        other => bail!("unsupported npy version {other}"),
    };
    let header_end = header_offset + header_len;
    if bytes.len() < header_end {
        bail!("npy header length exceeds payload size");
    }
    let header = std::str::from_utf8(&bytes[header_offset..header_end])
        .context("npy header is not valid utf-8")?;

    let descr = header_field(header, "descr").ok_or_else(|| anyhow!("npy header missing 'descr'"))?;
    if descr != "<f4" {
        bail!("unsupported npy dtype '{descr}', expected '<f4'");
    }
    if header_field(header, "fortran_order") != Some("False") {
        bail!("only C-ordered npy arrays are supported");
    }
    let shape = shape(header).ok_or_else(|| anyhow!("npy header missing 'shape'"))?;
    let (rows, cols) = match shape.as_slice() {
        [n] => (1, *n),
        [r, c] => (*r, *c),
        other => bail!("expected a 1-D or 2-D array, got shape {other:?}"),
    };

    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| anyhow!("npy shape overflow: {shape:?}"))?;
    let data_bytes = &bytes[header_end..];
    if data_bytes.len() != expected {
        bail!(
            "npy data size mismatch: expected {expected} bytes, got {}",
            data_bytes.len()
        );
    }
    let data = data_bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(Matrix { rows, cols, data })
}

fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{key}':");
    let start = header.find(&pattern)? + pattern.len();
    let rest = header[start..].trim_start();

    if let Some(quoted) = rest.strip_prefix('\'') {
        return quoted.find('\'').map(|end| &quoted[..end]);
    }
    let end = rest.find([',', '}']).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn shape(header: &str) -> Option<Vec<usize>> {
    let start = header.find("'shape':")?;
    let rest = &header[start..];
    let open = rest.find('(')?;
    let close = rest[open..].find(')')? + open;
    rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn npy_bytes(shape: &str, values: &[f32]) -> Vec<u8> {
        let mut header = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {shape}, }}");
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut out = b"\x93NUMPY\x01\x00".to_vec();
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn write_npz(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_parse_two_dimensional_array() {
        let m = parse_npy_f32(&npy_bytes("(2, 3)", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])).unwrap();
        assert_eq!((m.rows, m.cols), (2, 3));
        assert_eq!(m.row(1).unwrap(), &[4.0, 5.0, 6.0]);
        assert!(m.row(2).is_err());
    }

    #[test]
    fn test_parse_one_dimensional_array_as_single_row() {
        let m = parse_npy_f32(&npy_bytes("(3,)", &[0.5, 0.25, 0.125])).unwrap();
        assert_eq!((m.rows, m.cols), (1, 3));
    }

    #[test]
    fn test_parse_rejects_size_mismatch() {
        assert!(parse_npy_f32(&npy_bytes("(2, 2)", &[1.0, 2.0, 3.0])).is_err());
    }

    #[test]
    fn test_parse_rejects_overflowing_shape() {
        let err = parse_npy_f32(&npy_bytes("(18446744073709551615, 2)", &[1.0, 2.0])).unwrap_err();
        assert!(err.to_string().contains("npy shape overflow"));

        let err = parse_npy_f32(&npy_bytes("(4611686018427387904,)", &[])).unwrap_err();
        assert!(err.to_string().contains("npy shape overflow"));
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        assert!(parse_npy_f32(b"PK\x03\x04 definitely not npy").is_err());
    }

    #[test]
    fn test_load_archive_keys_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voices.npz");
        write_npz(
            &path,
            &[
                ("expr-voice-2-f.npy", npy_bytes("(1, 2)", &[0.1, 0.2])),
                ("README.txt", b"ignored".to_vec()),
            ],
        );

        let arrays = load(&path).unwrap();
        assert_eq!(arrays.len(), 1);
        assert_eq!(arrays["expr-voice-2-f"].data, vec![0.1, 0.2]);
    }
}
