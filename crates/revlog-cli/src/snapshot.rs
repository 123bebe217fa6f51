//! Reading a project directory into a [`FileMap`] and writing one back out.

use std::{
  ffi::OsStr,
  fs,
  path::{Component, Path, PathBuf},
};

use anyhow::{Context as _, bail};
use revlog_core::store::FileMap;
use walkdir::{DirEntry, WalkDir};

const IGNORED_DIRS: &[&str] = &[".git", ".hg", ".svn"];

fn is_ignored_dir(entry: &DirEntry) -> bool {
  entry.depth() > 0
    && entry.file_type().is_dir()
    && IGNORED_DIRS.iter().any(|name| entry.file_name() == OsStr::new(name))
}

/// Paths of the store database and its SQLite side files, so a store kept
/// inside the project is not snapshotted into itself.
pub fn store_artifacts(db_path: &Path) -> Vec<PathBuf> {
  let Some(name) = db_path.file_name() else {
    return Vec::new();
  };
  let parent = match db_path.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  };
  let Ok(parent) = parent.canonicalize() else {
    return Vec::new();
  };

  ["", "-wal", "-shm", "-journal"]
    .iter()
    .map(|suffix| {
      let mut file = name.to_os_string();
      file.push(suffix);
      parent.join(file)
    })
    .collect()
}

/// Project-relative key for `path`, always `/`-separated.
fn relative_key(root: &Path, path: &Path) -> anyhow::Result<String> {
  let relative = path
    .strip_prefix(root)
    .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;

  let mut parts = Vec::new();
  for component in relative.components() {
    match component {
      Component::Normal(part) => match part.to_str() {
        Some(part) => parts.push(part),
        None => bail!("{} is not valid UTF-8", path.display()),
      },
      other => bail!("unexpected path component {other:?} in {}", path.display()),
    }
  }
  Ok(parts.join("/"))
}

/// Read every regular file under `root`, skipping VCS directories and any
/// path listed in `exclude`.
pub fn collect_files(root: &Path, exclude: &[PathBuf]) -> anyhow::Result<FileMap> {
  let root = root
    .canonicalize()
    .with_context(|| format!("failed to resolve {}", root.display()))?;

  let mut files = FileMap::new();
  for entry in WalkDir::new(&root).into_iter().filter_entry(|e| !is_ignored_dir(e)) {
    let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
    if !entry.file_type().is_file() || exclude.iter().any(|p| p == entry.path()) {
      continue;
    }
    let key = relative_key(&root, entry.path())?;
    let content =
      fs::read(entry.path()).with_context(|| format!("failed to read {}", entry.path().display()))?;
    files.insert(key, content);
  }

  tracing::debug!(root = %root.display(), files = files.len(), "collected project files");
  Ok(files)
}

/// Resolve a stored key under `dir`, rejecting keys that would escape it.
pub fn destination(dir: &Path, key: &str) -> anyhow::Result<PathBuf> {
  let relative = Path::new(key);
  if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
    bail!("refusing to write {key:?} outside {}", dir.display());
  }
  Ok(dir.join(relative))
}

/// Write `files` under `dir`, creating directories as needed.
pub fn write_files(dir: &Path, files: &FileMap) -> anyhow::Result<()> {
  for (key, content) in files {
    let path = destination(dir, key)?;
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn collects_nested_files_with_slash_keys() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src/bin")).unwrap();
    fs::create_dir_all(dir.path().join(".git")).unwrap();
    fs::write(dir.path().join("src/bin/tool.rs"), "tool").unwrap();
    fs::write(dir.path().join("README"), "readme").unwrap();
    fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();

    let files = collect_files(dir.path(), &[]).unwrap();
    assert_eq!(files.keys().collect::<Vec<_>>(), ["README", "src/bin/tool.rs"]);
    assert_eq!(files["src/bin/tool.rs"], b"tool");
  }

  #[test]
  fn store_files_are_excluded() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("revlog.db");
    fs::write(&db, "db").unwrap();
    fs::write(dir.path().join("revlog.db-wal"), "wal").unwrap();
    fs::write(dir.path().join("kept.txt"), "kept").unwrap();

    let files = collect_files(dir.path(), &store_artifacts(&db)).unwrap();
    assert_eq!(files.keys().collect::<Vec<_>>(), ["kept.txt"]);
  }

  #[test]
  fn written_files_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let files: FileMap = [
      ("a/b/c.txt".to_owned(), b"deep".to_vec()),
      ("top".to_owned(), b"top".to_vec()),
    ]
    .into();

    write_files(dir.path(), &files).unwrap();
    assert_eq!(collect_files(dir.path(), &[]).unwrap(), files);
  }

  #[test]
  fn escaping_keys_are_rejected() {
    let dir = Path::new("/tmp/out");
    assert!(destination(dir, "../etc/passwd").is_err());
    assert!(destination(dir, "/abs").is_err());
    assert_eq!(destination(dir, "ok/file").unwrap(), dir.join("ok/file"));
  }
}
