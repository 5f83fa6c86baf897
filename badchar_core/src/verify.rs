use crate::analysis::{ByteAnalysis, analyze};
use crate::bad_chars::BadCharSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment problems that prevent a verdict from being reached.
///
/// These are kept apart from a failing [`VerificationVerdict`]: a missing file
/// points at the harness setup, not at the transformer.
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Input file does not exist: {0:?}")]
    MissingInput(PathBuf),

    #[error("Output file does not exist: {0:?}")]
    MissingOutput(PathBuf),

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of comparing an original byte sequence with its processed form.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationVerdict {
    pub passed: bool,
    pub original: ByteAnalysis,
    /// `None` in audit-only mode.
    pub processed: Option<ByteAnalysis>,
    /// Processed length minus original length. Diagnostic only.
    pub size_delta: Option<i64>,
}

impl VerificationVerdict {
    pub fn is_audit_only(&self) -> bool {
        self.processed.is_none()
    }
}

/// Pass iff the processed bytes carry no bad byte. Without processed bytes the
/// original itself must be clean.
pub fn verify(
    original: &[u8],
    processed: Option<&[u8]>,
    bad_chars: &BadCharSet,
) -> VerificationVerdict {
    let original_analysis = analyze(original, bad_chars);

    match processed {
        None => VerificationVerdict {
            passed: original_analysis.is_clean(),
            original: original_analysis,
            processed: None,
            size_delta: None,
        },
        Some(processed) => {
            let processed_analysis = analyze(processed, bad_chars);
            let size_delta = processed.len() as i64 - original.len() as i64;
            VerificationVerdict {
                passed: processed_analysis.is_clean(),
                original: original_analysis,
                processed: Some(processed_analysis),
                size_delta: Some(size_delta),
            }
        }
    }
}

/// Reads both files from disk and runs [`verify`].
pub fn verify_files(
    input_path: &Path,
    output_path: Option<&Path>,
    bad_chars: &BadCharSet,
) -> Result<VerificationVerdict, VerifyError> {
    if !input_path.exists() {
        return Err(VerifyError::MissingInput(input_path.to_path_buf()));
    }
    let original = read_bytes(input_path)?;

    let processed = match output_path {
        Some(path) if !path.exists() => return Err(VerifyError::MissingOutput(path.to_path_buf())),
        Some(path) => Some(read_bytes(path)?),
        None => None,
    };

    Ok(verify(&original, processed.as_deref(), bad_chars))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, VerifyError> {
    fs::read(path).map_err(|source| VerifyError::Io {
        path: path.to_path_buf(),
        source,
    })
}
