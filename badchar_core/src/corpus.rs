use globset::{Glob, GlobMatcher};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Errors raised while enumerating a corpus directory.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The corpus root is missing or is a regular file.
    #[error("Corpus path {0:?} does not exist or is not a directory")]
    NotADirectory(PathBuf),

    /// The file name pattern could not be compiled into a glob.
    #[error("Invalid file pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Directory traversal failed part way through.
    #[error("Failed to walk corpus directory: {0}")]
    Walk(String),

    /// A corpus file could not be read.
    #[error("Corpus I/O error: {0}")]
    Io(String),
}

impl From<walkdir::Error> for DiscoveryError {
    fn from(err: walkdir::Error) -> Self {
        DiscoveryError::Walk(err.to_string())
    }
}

/// One input binary found under a corpus root.
///
/// Discovery only stats the file. Contents are read later, per file, so an
/// unreadable input fails on its own instead of failing the whole listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    /// File name without directories, e.g. `bind_shell.bin`.
    pub name: String,
    pub path: PathBuf,
    /// Path below the corpus root. Used to mirror inputs onto an output tree.
    pub relative_path: PathBuf,
    pub size_bytes: u64,
}

impl CorpusFile {
    fn from_entry(root: &Path, entry: &walkdir::DirEntry) -> Result<Self, DiscoveryError> {
        let path = entry.path();
        let size_bytes = entry.metadata()?.len();
        let relative_path = path.strip_prefix(root).unwrap_or(path).to_path_buf();

        Ok(Self {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: path.to_path_buf(),
            relative_path,
            size_bytes,
        })
    }

    /// Lowercase hex MD5 of the file contents.
    pub fn md5_digest(&self) -> Result<String, DiscoveryError> {
        let data = fs::read(&self.path)
            .map_err(|e| DiscoveryError::Io(format!("Failed to read {:?}: {e}", self.path)))?;
        Ok(format!("{:x}", md5::compute(&data)))
    }
}

fn compile_pattern(pattern: &str) -> Result<GlobMatcher, DiscoveryError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| DiscoveryError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Lists regular files under `root` whose file name matches `pattern`.
///
/// Without `recursive` only the immediate children of `root` are considered.
/// The result is sorted by path relative to `root`.
pub fn discover(
    root: &Path,
    pattern: &str,
    recursive: bool,
) -> Result<Vec<CorpusFile>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }
    let matcher = compile_pattern(pattern)?;
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if !matcher.is_match(entry.file_name()) {
            continue;
        }
        files.push(CorpusFile::from_entry(root, &entry)?);
    }
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    debug!(
        "Discovered {} files matching {:?} under {:?}",
        files.len(),
        pattern,
        root
    );
    Ok(files)
}

/// Sum of file sizes, for run metadata.
pub fn total_size(files: &[CorpusFile]) -> u64 {
    files.iter().map(|f| f.size_bytes).sum()
}
