//! Directory import: walk, filter, hash.
//!
//! The content address of an imported directory is the SHA-256 of its files
//! in path order, so the same tree always yields the same key.

use std::io::Read;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use sha2::{Digest, Sha256};
use walkdir::{DirEntry, WalkDir};

use crate::archive::{ArchiveError, ArchiveKey, ImportSummary};

/// Per-directory ignore file.
pub const IGNORE_FILE: &str = ".datignore";

/// Manifest file name.
pub const MANIFEST_FILE: &str = "dat.json";

/// Always skipped, after any user rule.
const BUILTIN_IGNORES: &[&str] = &[".dat/", ".git/", "/.datignore"];

/// gitignore rules for one import root: `.datignore`, then the configured
/// extras, then the builtins. Nothing inside an excluded directory is read.
struct IgnoreRules {
    gitignore: Gitignore,
}

impl IgnoreRules {
    fn load(root: &Path, extra: &[String]) -> Result<Self, ArchiveError> {
        let mut builder = GitignoreBuilder::new(root);

        let ignore_path = root.join(IGNORE_FILE);
        match std::fs::read_to_string(&ignore_path) {
            Ok(text) => {
                for line in text.lines() {
                    builder.add_line(Some(ignore_path.clone()), line)?;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ArchiveError::Io {
                    path: ignore_path,
                    source,
                })
            }
        }
        for line in extra.iter().map(String::as_str).chain(BUILTIN_IGNORES.iter().copied()) {
            builder.add_line(None, line)?;
        }

        Ok(Self {
            gitignore: builder.build()?,
        })
    }

    fn excludes(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && self
                .gitignore
                .matched(entry.path(), entry.file_type().is_dir())
                .is_ignore()
    }
}

/// Walk `root`, skipping ignored paths, and hash what remains.
pub async fn import_dir(root: &Path, extra_ignores: &[String]) -> Result<ImportSummary, ArchiveError> {
    let root = root.to_path_buf();
    let extra = extra_ignores.to_vec();
    let task_root = root.clone();
    tokio::task::spawn_blocking(move || hash_files(&task_root, &collect_files(&task_root, &extra)?))
        .await
        .map_err(|e| ArchiveError::Io {
            path: root,
            source: std::io::Error::other(e),
        })?
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError {
    let path = path.to_path_buf();
    move |source| ArchiveError::Io { path, source }
}

/// Sorted `/`-separated relative paths of every included file.
fn collect_files(root: &Path, extra_ignores: &[String]) -> Result<Vec<String>, ArchiveError> {
    let meta = std::fs::metadata(root).map_err(io_err(root))?;
    if !meta.is_dir() {
        return Err(ArchiveError::NotADirectory(root.to_path_buf()));
    }
    let rules = IgnoreRules::load(root, extra_ignores)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !rules.excludes(e))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(rel.join("/"));
    }
    files.sort();
    Ok(files)
}

fn hash_files(root: &Path, files: &[String]) -> Result<ImportSummary, ArchiveError> {
    let mut hasher = Sha256::new();
    let mut bytes = 0u64;
    let mut content = Vec::new();
    for rel in files {
        let path: PathBuf = root.join(rel);
        content.clear();
        std::fs::File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut content))
            .map_err(io_err(&path))?;
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update((content.len() as u64).to_le_bytes());
        hasher.update(&content);
        bytes += content.len() as u64;
    }

    Ok(ImportSummary {
        key: ArchiveKey::from_digest(&hasher.finalize()),
        files: files.len(),
        bytes,
    })
}
