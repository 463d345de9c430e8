//! Source tree scanning: turns a directory of markdown files into
//! [`Document`]s carrying their hierarchy paths.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::detect::content_hash;
use crate::error::SyncError;

/// One source file, ready for classification and sync.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the sync root with `/` separators. This is the key
    /// into the state's `pages` map.
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub content: String,
    pub content_hash: String,
    /// Ordered container names from the sync root down to the immediate
    /// parent directory. Empty for files directly under the root.
    pub hierarchy: Vec<String>,
}

/// Walks `root` recursively and returns every markdown file not matched by
/// an exclude pattern, sorted by relative path for a deterministic pass.
pub fn scan_tree(root: &Path, excludes: &[Regex]) -> Result<Vec<Document>, SyncError> {
    if !root.is_dir() {
        return Err(SyncError::Configuration(format!(
            "source directory {} does not exist",
            root.display()
        )));
    }
    let mut documents = Vec::new();
    visit_dir(root, root, excludes, &mut documents)?;
    documents.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(documents)
}

/// Builds the [`Document`] for a single file under `root`. Used by the
/// force single-file mode.
pub fn load_document(root: &Path, file: &Path) -> Result<Document, SyncError> {
    let abs = if file.is_absolute() {
        file.to_path_buf()
    } else {
        root.join(file)
    };
    let rel = abs.strip_prefix(root).map_err(|_| {
        SyncError::Configuration(format!(
            "{} is not inside the source directory {}",
            abs.display(),
            root.display()
        ))
    })?;
    read_document(&abs, rel)
}

fn visit_dir(
    dir: &Path,
    root: &Path,
    excludes: &[Regex],
    results: &mut Vec<Document>,
) -> Result<(), SyncError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if file_name.starts_with('.') {
            debug!(path = %path.display(), "Skipping hidden entry");
            continue;
        }
        let rel = path.strip_prefix(root).unwrap_or(&path);
        let rel_key = rel_key(rel);
        if excludes.iter().any(|re| re.is_match(&rel_key)) {
            debug!(path = %rel_key, "Excluded by pattern");
            continue;
        }
        if path.is_dir() {
            visit_dir(&path, root, excludes, results)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("md") {
            results.push(read_document(&path, rel)?);
        }
    }
    Ok(())
}

fn read_document(abs: &Path, rel: &Path) -> Result<Document, SyncError> {
    let content = std::fs::read_to_string(abs)?;
    let hash = content_hash(content.as_bytes());
    let hierarchy = rel
        .parent()
        .map(|parent| {
            parent
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    Ok(Document {
        rel_path: rel_key(rel),
        abs_path: abs.to_path_buf(),
        content,
        content_hash: hash,
        hierarchy,
    })
}

fn rel_key(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn scan_finds_markdown_and_derives_hierarchy() {
        let dir = tempdir().unwrap();
        write(dir.path(), "intro.md", "# Intro");
        write(dir.path(), "a/one.md", "# One");
        write(dir.path(), "a/b/two.md", "# Two");
        write(dir.path(), "a/notes.txt", "not markdown");

        let docs = scan_tree(dir.path(), &[]).unwrap();
        let paths: Vec<_> = docs.iter().map(|d| d.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a/b/two.md", "a/one.md", "intro.md"]);

        let two = docs.iter().find(|d| d.rel_path == "a/b/two.md").unwrap();
        assert_eq!(two.hierarchy, vec!["a".to_string(), "b".to_string()]);
        let intro = docs.iter().find(|d| d.rel_path == "intro.md").unwrap();
        assert!(intro.hierarchy.is_empty());
    }

    #[test]
    fn excludes_drop_files_and_whole_directories() {
        let dir = tempdir().unwrap();
        write(dir.path(), "keep.md", "k");
        write(dir.path(), "drafts/wip.md", "w");
        write(dir.path(), "a/skip-this.md", "s");

        let excludes = vec![
            Regex::new("^drafts").unwrap(),
            Regex::new("skip-.*\\.md$").unwrap(),
        ];
        let docs = scan_tree(dir.path(), &excludes).unwrap();
        let paths: Vec<_> = docs.iter().map(|d| d.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["keep.md"]);
    }

    #[test]
    fn load_document_rejects_paths_outside_root() {
        let dir = tempdir().unwrap();
        let other = tempdir().unwrap();
        write(other.path(), "outside.md", "x");
        let result = load_document(dir.path(), &other.path().join("outside.md"));
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }
}
