//! Contains utilities and helper functions that aid in capture processing.
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use statrs::statistics::{Data, Distribution};
use std::path::Path;

use crate::errors::CaptureError;

/// Reads a capture file into memory.
pub fn load_file(filepath: &Path) -> Result<Vec<u8>, CaptureError> {
    log::info!("Loading capture file {}", filepath.display());
    let buf = std::fs::read(filepath)?;
    log::debug!("Read {} bytes", buf.len());
    Ok(buf)
}

/// MD5 hash of a normalized description, hex encoded.
pub fn get_md5_hash(string_in: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(string_in);
    let result = hasher.finalize();

    hex::encode(result)
}

/// Formats a capture timestamp for humans. Out-of-range values fall back to the raw number.
pub fn format_micros(micros: i64) -> String {
    match DateTime::<Utc>::from_timestamp_micros(micros) {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        None => format!("{micros}us"),
    }
}

/// Mean of the values, `None` when empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Data::new(values.to_vec()).mean()
}

/// Mean and sample standard deviation; a spread needs at least two values.
pub fn mean_std_dev(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let data = Data::new(values.to_vec());
    Some((data.mean()?, data.std_dev()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_is_hex_and_stable() {
        let a = get_md5_hash("patterns=tor_port");
        assert_eq!(a.len(), 32);
        assert_eq!(a, get_md5_hash("patterns=tor_port"));
        assert_ne!(a, get_md5_hash("patterns=cell_sized"));
    }

    #[test]
    fn mean_std_dev_of_constant_is_zero_spread() {
        let (mean, sd) = mean_std_dev(&[0.4, 0.4, 0.4]).unwrap();
        assert!((mean - 0.4).abs() < 1e-12);
        assert!(sd.abs() < 1e-12);
        assert!(mean_std_dev(&[]).is_none());
        assert!(mean_std_dev(&[0.4]).is_none());
    }

    #[test]
    fn spread_is_the_sample_standard_deviation() {
        let (mean, sd) = mean_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((mean - 5.0).abs() < 1e-12);
        // sum of squared deviations is 32 over 7 degrees of freedom
        assert!((sd - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(mean_std_dev(&[1.0, 3.0]).map(|(m, _)| m), Some(2.0));
        assert_eq!(super::mean(&[5.0]), Some(5.0));
        assert!(super::mean(&[]).is_none());
    }

    #[test]
    fn formats_epoch() {
        assert_eq!(format_micros(0), "1970-01-01 00:00:00.000 UTC");
    }

    #[test]
    fn load_file_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.pcap");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert_eq!(load_file(&path).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            load_file(&dir.path().join("missing.pcap")),
            Err(CaptureError::Io(_))
        ));
    }
}
