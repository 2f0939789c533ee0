use anyhow::{Context, Result};
use memmap2::Mmap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the reference root, forward slashes. For a single-file
    /// reference this is the file name.
    pub relative_path: String,
    pub full_path: PathBuf,
    pub size: u64,
}

/// Collect the reference files under `root` (or `root` itself when it is a file),
/// sorted by relative path so source ids are stable across runs.
pub fn collect_sources(root: &Path) -> Result<Vec<SourceFile>> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to canonicalize path: {}", root.display()))?;

    if root.is_file() {
        let name = root
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Non-UTF8 path: {}", root.display()))?
            .to_string();
        let size = std::fs::metadata(&root)
            .with_context(|| format!("Failed to read metadata: {}", root.display()))?
            .len();
        return Ok(vec![SourceFile {
            relative_path: name,
            full_path: root,
            size,
        }]);
    }

    let mut entries = Vec::new();

    for entry in WalkDir::new(&root).min_depth(1) {
        let entry = entry
            .with_context(|| format!("Failed to read directory entry in {}", root.display()))?;

        if !entry.file_type().is_file() {
            if !entry.file_type().is_dir() {
                tracing::warn!(path = %entry.path().display(), "Skipping non-regular file");
            }
            continue;
        }

        let full_path = entry.path().to_path_buf();
        let relative = full_path
            .strip_prefix(&root)
            .with_context(|| "Failed to compute relative path")?;

        let relative_str = relative
            .to_str()
            .with_context(|| format!("Non-UTF8 path: {}", relative.display()))?
            .replace('\\', "/");

        let meta = entry
            .metadata()
            .with_context(|| format!("Failed to read metadata: {}", full_path.display()))?;

        entries.push(SourceFile {
            relative_path: relative_str,
            full_path,
            size: meta.len(),
        });
    }

    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(entries)
}

/// Resolve the on-disk path of a source recorded as `relative_path` under `root`.
pub fn resolve_source(root: &Path, relative_path: &str) -> PathBuf {
    if root.is_file() {
        root.to_path_buf()
    } else {
        root.join(relative_path)
    }
}

/// Memory-map a file for read-only access.
///
/// # Safety
/// The mapping is read-only. Callers must not concurrently truncate or replace
/// the underlying file while the `Mmap` is live.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    // SAFETY: We only read from this mapping; no concurrent modification of these files.
    unsafe {
        Mmap::map(&file)
            .with_context(|| format!("Failed to memory-map file: {}", path.display()))
    }
}

/// File contents, memory-mapped unless the file is empty.
pub enum FileData {
    Mapped(Mmap),
    Empty,
}

impl Deref for FileData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileData::Mapped(map) => &map[..],
            FileData::Empty => &[],
        }
    }
}

/// Load a file for reading, without trying to map zero-length files.
pub fn load_file(path: &Path) -> Result<FileData> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
    if meta.len() == 0 {
        return Ok(FileData::Empty);
    }
    mmap_file(path).map(FileData::Mapped)
}

/// Compute the BLAKE3 hash of a byte slice.
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}
