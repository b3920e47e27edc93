//! Local document store.
//!
//! Uploaded PDF and DOCX files are copied into a flat directory
//! (`[storage].dir`, default `archivos/`). Saving never overwrites: a name
//! that already exists gets a `_{unix_timestamp}` suffix, and a numeric
//! counter on top of that if two uploads land in the same second.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;
use walkdir::WalkDir;

use lexrag_core::models::DocumentFormat;

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` under the base name of `name` and return the final path.
    pub fn save(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .with_context(|| format!("invalid file name: {:?}", name))?;
        DocumentFormat::from_path(Path::new(file_name))?;

        self.ensure_dir()?;
        let path = self.free_path(file_name);
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), bytes = bytes.len(), "document stored");
        Ok(path)
    }

    /// Copy an existing file into the store.
    pub fn import(&self, source: &Path) -> Result<PathBuf> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("invalid file name: {}", source.display()))?;
        let bytes = std::fs::read(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        self.save(name, &bytes)
    }

    /// Stored `.pdf` / `.docx` file names, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        self.ensure_dir()?;
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if DocumentFormat::from_path(Path::new(&name)).is_ok() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Resolve a user-supplied document reference: the path as given if it
    /// exists, otherwise a file of that name inside the store.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let direct = PathBuf::from(reference);
        if direct.is_file() {
            return Ok(direct);
        }
        let stored = self.dir.join(reference);
        if stored.is_file() {
            return Ok(stored);
        }
        bail!(
            "document not found: {} (also looked in {})",
            reference,
            self.dir.display()
        )
    }

    fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))
    }

    fn free_path(&self, file_name: &str) -> PathBuf {
        let candidate = self.dir.join(file_name);
        if !candidate.exists() {
            return candidate;
        }

        let (stem, ext) = match file_name.rfind('.') {
            Some(dot) if dot > 0 => file_name.split_at(dot),
            _ => (file_name, ""),
        };
        let stamp = chrono::Utc::now().timestamp();
        let stamped = self.dir.join(format!("{}_{}{}", stem, stamp, ext));
        if !stamped.exists() {
            return stamped;
        }
        (1u32..)
            .map(|n| self.dir.join(format!("{}_{}_{}{}", stem, stamp, n, ext)))
            .find(|p| !p.exists())
            .unwrap_or(stamped)
    }
}
