//! File-system helpers: source resolution, safe writes, re-rooting of batch
//! inputs and glob resolution.

use std::path::{Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;

use crate::error::Error;

/// Input to a conversion: literal text or a file on disk.
#[derive(Debug, Clone)]
pub enum Source {
    Data(String),
    File { cwd: PathBuf, filename: PathBuf },
}

/// Resolved source text plus the filename it came from, if any.
#[derive(Debug, Clone)]
pub struct SourceData {
    pub data: String,
    pub filename: Option<PathBuf>,
}

/// Resolve a [`Source`] into text, reading the file when necessary.
pub async fn get_source(source: &Source) -> Result<SourceData, Error> {
    match source {
        Source::Data(data) => Ok(SourceData {
            data: data.clone(),
            filename: None,
        }),
        Source::File { cwd, filename } => {
            let path = ensure_absolute(filename, cwd);
            let data = tokio::fs::read_to_string(&path).await?;
            Ok(SourceData {
                data,
                filename: Some(path),
            })
        }
    }
}

/// Write a file, creating missing parent directories once and retrying the
/// write exactly once. Any other failure propagates unmodified.
pub async fn write_file(filename: &Path, data: &str) -> Result<(), Error> {
    match tokio::fs::write(filename, data).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = filename.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(filename, data).await?;
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// Path of `to` relative to `from`, falling back to `to` itself when it is
/// not inside `from`.
pub fn rel_file(from: Option<&Path>, to: &Path) -> PathBuf {
    match from {
        Some(from) => to.strip_prefix(from).unwrap_or(to).to_path_buf(),
        None => to.to_path_buf(),
    }
}

/// Make `filename` absolute, resolving it against `cwd` when relative.
pub fn ensure_absolute(filename: &Path, cwd: &Path) -> PathBuf {
    if filename.is_absolute() {
        filename.to_path_buf()
    } else {
        cwd.join(filename)
    }
}

/// The deepest common directory of a set of files.
pub fn root_folder_of_files(files: &[PathBuf], cwd: &Path) -> PathBuf {
    let dirs: Vec<PathBuf> = files
        .iter()
        .map(|file| {
            ensure_absolute(file, cwd)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        })
        .collect();

    let Some(first) = dirs.first() else {
        return cwd.to_path_buf();
    };

    let mut common: Vec<_> = first.components().collect();
    for dir in &dirs[1..] {
        let components: Vec<_> = dir.components().collect();
        let shared = common
            .iter()
            .zip(&components)
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(shared);
    }
    common.iter().collect()
}

/// One batch input after re-rooting: absolute input path, absolute output
/// path, and the path relative to the common root.
#[derive(Debug, Clone)]
pub struct RootedFile {
    pub input: PathBuf,
    pub output: PathBuf,
    pub rel: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RootedFiles {
    pub root: PathBuf,
    pub new_root: PathBuf,
    pub files: Vec<RootedFile>,
}

/// Compute the common root of `files`, their paths relative to it, and their
/// output paths under `new_root` (defaulting to the common root itself).
pub fn re_root_files(files: &[PathBuf], cwd: &Path, new_root: Option<&Path>) -> RootedFiles {
    let root = root_folder_of_files(files, cwd);
    let new_root = match new_root {
        Some(dir) => ensure_absolute(dir, cwd),
        None => root.clone(),
    };

    let files = files
        .iter()
        .map(|file| {
            let input = ensure_absolute(file, cwd);
            let rel = rel_file(Some(&root), &input);
            let output = new_root.join(&rel);
            RootedFile { input, output, rel }
        })
        .collect();

    RootedFiles {
        root,
        new_root,
        files,
    }
}

/// Resolve glob patterns under `cwd` to files.
///
/// With `hidden` (the default), dotfiles are included, `.git` is skipped and
/// `.gitignore` files are honored. Without it, hidden files are skipped and
/// gitignore handling is off.
fn has_hidden_component(path: &Path, cwd: &Path) -> bool {
    rel_file(Some(cwd), path)
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}

pub fn glob(patterns: &[String], cwd: &Path, hidden: bool) -> Result<Vec<PathBuf>, Error> {
    let mut overrides = OverrideBuilder::new(cwd);
    for pattern in patterns {
        overrides
            .add(pattern)
            .map_err(|err| Error::Glob(err.to_string()))?;
    }
    overrides
        .add("!.git/")
        .map_err(|err| Error::Glob(err.to_string()))?;
    let overrides = overrides.build().map_err(|err| Error::Glob(err.to_string()))?;

    let walker = WalkBuilder::new(cwd)
        .overrides(overrides)
        .hidden(!hidden)
        .git_ignore(hidden)
        .git_global(false)
        .git_exclude(hidden)
        .require_git(false)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|err| Error::Glob(err.to_string()))?;
        if entry.file_type().is_some_and(|t| t.is_file()) {
            let path = entry.into_path();
            // Override matches bypass the walker's hidden filtering, so
            // enforce it on matched paths too.
            if !hidden && has_hidden_component(&path, cwd) {
                continue;
            }
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Change the extension of a filename; `extension` may carry a leading dot.
/// A compound extension such as `d.ts` replaces only the final extension.
pub fn change_extension(filename: &Path, extension: &str) -> PathBuf {
    let extension = extension.strip_prefix('.').unwrap_or(extension);
    filename.with_extension(extension)
}

/// A file path styled for terminal output: dirname plain, basename bold.
pub fn pretty_file(filename: &Path) -> String {
    let basename = filename
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    match filename.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            format!(
                "{}{}{}",
                dir.display(),
                std::path::MAIN_SEPARATOR,
                console::style(basename).bold()
            )
        }
        _ => console::style(basename).bold().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_file_creates_missing_directories() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("a/b/c.json");
        write_file(&target, "{}").await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{}");
    }

    #[test]
    fn test_root_folder_of_files() {
        let files = vec![
            PathBuf::from("/data/api/v1/user.json"),
            PathBuf::from("/data/api/v2/item.json"),
        ];
        assert_eq!(
            root_folder_of_files(&files, Path::new("/")),
            PathBuf::from("/data/api")
        );
    }

    #[test]
    fn test_root_folder_single_file() {
        let files = vec![PathBuf::from("/data/api/user.json")];
        assert_eq!(
            root_folder_of_files(&files, Path::new("/")),
            PathBuf::from("/data/api")
        );
    }

    #[test]
    fn test_re_root_files_with_new_root() {
        let files = vec![
            PathBuf::from("schemas/a.json"),
            PathBuf::from("schemas/sub/b.json"),
        ];
        let rooted = re_root_files(&files, Path::new("/work"), Some(Path::new("out")));
        assert_eq!(rooted.root, PathBuf::from("/work/schemas"));
        assert_eq!(rooted.new_root, PathBuf::from("/work/out"));
        assert_eq!(rooted.files[0].output, PathBuf::from("/work/out/a.json"));
        assert_eq!(rooted.files[1].rel, PathBuf::from("sub/b.json"));
    }

    #[test]
    fn test_change_extension() {
        assert_eq!(
            change_extension(Path::new("dir/file.json"), ".ts"),
            PathBuf::from("dir/file.ts")
        );
        assert_eq!(
            change_extension(Path::new("file.yaml"), "json"),
            PathBuf::from("file.json")
        );
    }

    #[test]
    fn test_glob_resolves_patterns() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("a.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("sub/b.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("c.yaml"), "").unwrap();

        let files = glob(&["**/*.json".to_string()], tmp.path(), true).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| rel_file(Some(tmp.path()), f))
            .collect();
        assert_eq!(
            names,
            vec![PathBuf::from("a.json"), PathBuf::from("sub/b.json")]
        );
    }

    #[test]
    fn test_glob_hidden_toggle() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".hidden.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("plain.json"), "{}").unwrap();
        std::fs::create_dir_all(tmp.path().join(".cache")).unwrap();
        std::fs::write(tmp.path().join(".cache/d.json"), "{}").unwrap();

        let with_hidden = glob(&["**/*.json".to_string()], tmp.path(), true).unwrap();
        assert_eq!(with_hidden.len(), 3);

        let without_hidden = glob(&["**/*.json".to_string()], tmp.path(), false).unwrap();
        assert_eq!(without_hidden.len(), 1);
        assert!(without_hidden[0].ends_with("plain.json"));
    }
}
