use crate::error::IngestionError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A PDF read from disk, ready for `RetrievalEngine::ingest`.
#[derive(Debug, Clone)]
pub struct Upload {
    pub path: PathBuf,
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if is_pdf(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// A single file is taken as given; a folder is searched recursively.
pub fn resolve_inputs(path: &Path) -> Result<Vec<PathBuf>, IngestionError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let files = discover_pdf_files(path);
    if files.is_empty() {
        return Err(IngestionError::NoPdfFiles(path.display().to_string()));
    }
    Ok(files)
}

pub async fn read_upload(path: &Path) -> Result<Upload, IngestionError> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string());

    Ok(Upload {
        path: path.to_path_buf(),
        filename,
        bytes,
    })
}
