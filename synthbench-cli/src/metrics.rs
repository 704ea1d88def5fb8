//! Candidate Size Metrics

use std::path::Path;

use synthbench_report::Metrics;

use crate::toolchain::Toolchain;

/// Measure a compiled candidate: source characters and library `.text` size
pub fn measure(source: &Path, library: &Path, toolchain: &Toolchain) -> std::io::Result<Metrics> {
    let text = std::fs::read_to_string(source)?;
    Ok(Metrics {
        n_chars: text.chars().count(),
        text_size: toolchain.text_size(library),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_counts_chars() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("f.s");
        std::fs::write(&source, "f:\n\tret\n").unwrap();
        let metrics = measure(&source, &dir.path().join("missing.so"), &Toolchain::default()).unwrap();
        assert_eq!(metrics.n_chars, 8);
        assert_eq!(metrics.text_size, None);
    }

    #[test]
    fn test_measure_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        assert!(measure(&dir.path().join("nope.s"), dir.path(), &Toolchain::default()).is_err());
    }
}
