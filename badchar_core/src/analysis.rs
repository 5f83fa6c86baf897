use crate::bad_chars::BadCharSet;
use std::collections::BTreeMap;

/// A maximal contiguous span of bad bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadRun {
    pub offset: usize,
    pub len: usize,
    /// The raw bytes of the span; may mix different forbidden values.
    pub bytes: Vec<u8>,
}

/// Result of scanning one byte sequence against a [`BadCharSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct ByteAnalysis {
    pub total_bytes: usize,
    pub bad_char_count: usize,
    pub bad_char_percentage: f64,
    /// Every member of the set has an entry, possibly empty. Offsets ascend.
    pub positions: BTreeMap<u8, Vec<usize>>,
    pub runs: Vec<BadRun>,
    pub max_consecutive: usize,
}

impl ByteAnalysis {
    pub fn is_clean(&self) -> bool {
        self.bad_char_count == 0
    }
}

/// Scans `data` once, left to right.
pub fn analyze(data: &[u8], bad_chars: &BadCharSet) -> ByteAnalysis {
    let mut positions: BTreeMap<u8, Vec<usize>> =
        bad_chars.iter().map(|b| (b, Vec::new())).collect();
    let mut runs: Vec<BadRun> = Vec::new();
    let mut current: Option<BadRun> = None;
    let mut bad_char_count = 0usize;

    for (offset, &byte) in data.iter().enumerate() {
        if bad_chars.contains(byte) {
            bad_char_count += 1;
            positions.entry(byte).or_default().push(offset);
            match current.as_mut() {
                Some(run) => {
                    run.len += 1;
                    run.bytes.push(byte);
                }
                None => {
                    current = Some(BadRun {
                        offset,
                        len: 1,
                        bytes: vec![byte],
                    });
                }
            }
        } else if let Some(run) = current.take() {
            runs.push(run);
        }
    }
    if let Some(run) = current.take() {
        runs.push(run);
    }

    let bad_char_percentage = if data.is_empty() {
        0.0
    } else {
        bad_char_count as f64 / data.len() as f64 * 100.0
    };
    let max_consecutive = runs.iter().map(|r| r.len).max().unwrap_or(0);

    ByteAnalysis {
        total_bytes: data.len(),
        bad_char_count,
        bad_char_percentage,
        positions,
        runs,
        max_consecutive,
    }
}

/// Counts bad bytes without building positions or runs.
pub fn count_bad_bytes(data: &[u8], bad_chars: &BadCharSet) -> usize {
    data.iter().filter(|&&b| bad_chars.contains(b)).count()
}
