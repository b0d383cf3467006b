//! Test data builders.

use barge_core::ContentHash;

/// Deterministic pseudo-random bytes for upload payloads.
#[allow(dead_code)]
pub fn patterned_bytes(len: usize, seed: u64) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u64).wrapping_mul(31).wrapping_add(seed) % 251) as u8)
        .collect()
}

/// Lowercase hex SHA-256 of `data`.
#[allow(dead_code)]
pub fn sha256_hex(data: &[u8]) -> String {
    ContentHash::compute(data).to_hex()
}

/// Build an in-memory ZIP archive with the given entries (stored, no
/// compression, so the fixture stays byte-stable).
#[allow(dead_code)]
pub fn zip_fixture(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::FileOptions;

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zw = zip::ZipWriter::new(&mut cursor);
        let opts = FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            zw.start_file(*name, opts).expect("start zip entry");
            zw.write_all(data).expect("write zip entry");
        }
        zw.finish().expect("finish zip");
    }
    cursor.into_inner()
}
