//! Workspace file I/O for the CLI.
//!
//! [`collect_files`] walks a workspace and builds the `FileMap` sent to
//! embed-and-store; [`write_files`] writes a generated `FileMap` to disk.
//! Keys are always `/`-separated paths relative to the workspace root.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CollectConfig;
use crate::models::FileMap;

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Read every file under `root` whose extension is allowed.
///
/// Files that are not valid UTF-8 are skipped.
pub fn collect_files(root: &Path, config: &CollectConfig) -> Result<FileMap> {
    if !root.is_dir() {
        bail!("Workspace directory does not exist: {}", root.display());
    }

    let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = FileMap::new();
    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let key = relative_key(relative);

        if exclude_set.is_match(&key) || !has_allowed_extension(path, &config.extensions) {
            continue;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => {
                files.insert(key, content);
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::debug!(path = %path.display(), "skipping non-UTF-8 file");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        }
    }

    tracing::debug!(root = %root.display(), files = files.len(), "collected workspace files");
    Ok(files)
}

/// Write each entry of `files` under `root`, creating directories as needed.
///
/// Absolute keys and keys containing `..` are rejected before anything is
/// written. Returns the written paths in key order.
pub fn write_files(root: &Path, files: &FileMap) -> Result<Vec<PathBuf>> {
    for key in files.keys() {
        check_relative(key)?;
    }

    let mut written = Vec::with_capacity(files.len());
    for (key, content) in files {
        let target = root.join(key);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(&target, content)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        written.push(target);
    }
    Ok(written)
}

fn check_relative(key: &str) -> Result<()> {
    let path = Path::new(key);
    if key.is_empty() || path.is_absolute() || key.starts_with('/') || key.starts_with('\\') {
        bail!("Refusing to write outside the output directory: {:?}", key);
    }
    if path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        bail!("Refusing to write outside the output directory: {:?}", key);
    }
    Ok(())
}

fn relative_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn has_allowed_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_collect_filters_by_extension_and_excludes() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "app/main.py", b"print('hi')");
        touch(tmp.path(), "app/README.md", b"# readme");
        touch(tmp.path(), "node_modules/lib/index.js", b"module.exports = 1");
        touch(tmp.path(), "src/lib.rs", b"pub fn f() {}");

        let files = collect_files(tmp.path(), &CollectConfig::default()).unwrap();
        let keys: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["app/main.py", "src/lib.rs"]);
    }

    #[test]
    fn test_collect_skips_non_utf8() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "bad.py", &[0xff, 0xfe, 0x00, 0x80]);
        touch(tmp.path(), "good.py", b"x = 1");

        let files = collect_files(tmp.path(), &CollectConfig::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files.contains_key("good.py"));
    }

    #[test]
    fn test_collect_custom_excludes() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "gen/out.ts", b"export {}");
        touch(tmp.path(), "web/app.ts", b"export {}");
        let config = CollectConfig {
            exclude_globs: vec!["gen/**".to_string()],
            ..CollectConfig::default()
        };

        let files = collect_files(tmp.path(), &config).unwrap();
        assert_eq!(files.keys().collect::<Vec<_>>(), vec!["web/app.ts"]);
    }

    #[test]
    fn test_collect_missing_root() {
        let tmp = TempDir::new().unwrap();
        assert!(collect_files(&tmp.path().join("nope"), &CollectConfig::default()).is_err());
    }

    #[test]
    fn test_write_files_creates_directories() {
        let tmp = TempDir::new().unwrap();
        let mut files = FileMap::new();
        files.insert("main.py".into(), "app = 1".into());
        files.insert("app/models.py".into(), "class User: ...".into());

        let written = write_files(tmp.path(), &files).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("app/models.py")).unwrap(),
            "class User: ..."
        );
    }

    #[test]
    fn test_write_files_rejects_escapes() {
        let tmp = TempDir::new().unwrap();
        for bad in ["../evil.py", "/etc/passwd", "a/../../b.py"] {
            let mut files = FileMap::new();
            files.insert("ok.py".into(), "x".into());
            files.insert(bad.into(), "x".into());
            assert!(write_files(tmp.path(), &files).is_err(), "accepted {}", bad);
            assert!(!tmp.path().join("ok.py").exists(), "partial write for {}", bad);
        }
    }
}
