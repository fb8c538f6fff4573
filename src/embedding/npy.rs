//! Minimal `.npy` v1.0 reader/writer for a row-major `float32` matrix.
//!
//! Stores vectors in the same row order as the index's id list, so that
//! an index can be rebuilt from the id list and this file alone. The
//! format itself (magic + header dict + raw little-endian data) is
//! simple enough to implement directly rather than pulling in a
//! general-purpose NumPy crate for one call site.

use std::io::{self, Read};
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Write `rows` (each of length `dim`) as a `.npy` v1.0 file.
pub fn write(path: &Path, rows: &[Vec<f32>], dim: usize) -> io::Result<()> {
    let shape = format!("({}, {}), ", rows.len(), dim);
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': {}}}",
        shape
    );
    // Pad so that magic(6) + version(2) + header_len(2) + header is a
    // multiple of 64, then terminate with '\n'.
    let prefix_len = 6 + 2 + 2;
    let mut total = prefix_len + header.len() + 1;
    let padding = (64 - (total % 64)) % 64;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');
    total = prefix_len + header.len();
    debug_assert_eq!(total % 64, 0);

    let mut out = Vec::with_capacity(total + rows.len() * dim * 4);
    out.extend_from_slice(MAGIC);
    out.push(1); // major version
    out.push(0); // minor version
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for row in rows {
        for &x in row {
            out.extend_from_slice(&x.to_le_bytes());
        }
    }

    let tmp = path.with_extension("npy.tmp");
    std::fs::write(&tmp, &out)?;
    std::fs::rename(&tmp, path)
}

/// Read a `.npy` v1.0 file written by [`write`], returning `(rows, dim)`.
pub fn read(path: &Path) -> io::Result<(Vec<Vec<f32>>, usize)> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    if buf.len() < 10 || &buf[0..6] != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad npy magic"));
    }
    let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
    let header_start = 10;
    let header_end = header_start + header_len;
    if buf.len() < header_end {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated npy header"));
    }
    let header = String::from_utf8_lossy(&buf[header_start..header_end]);
    let shape = parse_shape(&header)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unparseable npy shape"))?;
    let (rows, dim) = shape;

    let data = &buf[header_end..];
    let expected = rows * dim * 4;
    if data.len() < expected {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated npy data"));
    }

    let mut out = Vec::with_capacity(rows);
    for r in 0..rows {
        let mut row = Vec::with_capacity(dim);
        for c in 0..dim {
            let offset = (r * dim + c) * 4;
            let bytes = [
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ];
            row.push(f32::from_le_bytes(bytes));
        }
        out.push(row);
    }
    Ok((out, dim))
}

fn parse_shape(header: &str) -> Option<(usize, usize)> {
    let start = header.find("'shape':")? + "'shape':".len();
    let rest = header[start..].trim_start();
    let open = rest.find('(')?;
    let close = rest.find(')')?;
    let inner = &rest[open + 1..close];
    let mut parts = inner.split(',').map(|p| p.trim()).filter(|p| !p.is_empty());
    let rows: usize = parts.next()?.parse().ok()?;
    let cols: usize = parts.next()?.parse().ok()?;
    Some((rows, cols))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.npy");
        write(&path, &[], 384).unwrap();
        let (rows, dim) = read(&path).unwrap();
        assert!(rows.is_empty());
        assert_eq!(dim, 384);
    }

    #[test]
    fn roundtrip_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.npy");
        let rows = vec![vec![1.0_f32, 2.0, 3.0], vec![-1.5, 0.0, 42.25]];
        write(&path, &rows, 3).unwrap();
        let (read_rows, dim) = read(&path).unwrap();
        assert_eq!(dim, 3);
        assert_eq!(read_rows.len(), 2);
        for (a, b) in rows.iter().zip(read_rows.iter()) {
            for (x, y) in a.iter().zip(b.iter()) {
                assert!((x - y).abs() < 1e-6);
            }
        }
    }
}
