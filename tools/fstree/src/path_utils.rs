use std::path::{Component, Path, PathBuf};

use crate::error::{FileError, Result};

/// Lexically normalizes an absolute path, collapsing `.` and `..`.
///
/// Symlinks are not consulted, so `/a/link/..` becomes `/a`.
pub fn normalize(path: &Path) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Err(FileError::InvalidArgument(format!(
            "path must be absolute: {}",
            path.display()
        )));
    }
    Ok(normalize_lossy(path))
}

/// Same as [`normalize`] without the absolute-path check. `..` never climbs
/// above the first component.
pub fn normalize_lossy(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.parent().is_some() {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Joins `pieces` onto `base` and normalizes the result.
pub fn join<I, S>(base: &Path, pieces: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<Path>,
{
    let mut path = base.to_path_buf();
    for piece in pieces {
        let piece = piece.as_ref();
        if piece.as_os_str().is_empty() {
            return Err(FileError::InvalidArgument(format!(
                "empty path piece under {}",
                base.display()
            )));
        }
        path.push(piece.strip_prefix("/").unwrap_or(piece));
    }
    normalize(&path)
}

/// Path of `to` relative to the directory `from`. Both must be absolute.
pub fn relative_path(from: &Path, to: &Path) -> Result<PathBuf> {
    let from = normalize(from)?;
    let to = normalize(to)?;

    let from_parts: Vec<_> = from.components().collect();
    let to_parts: Vec<_> = to.components().collect();
    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from_parts.len() {
        relative.push("..");
    }
    for part in &to_parts[common..] {
        relative.push(part.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    Ok(relative)
}

/// Expands a leading `~` and makes relative paths absolute against `cwd`.
pub fn absolutize(raw: &Path, cwd: &Path, home: Option<&Path>) -> Result<PathBuf> {
    let expanded = match (raw.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        (Ok(_), None) => {
            return Err(FileError::InvalidArgument(
                "cannot expand ~ without a home directory".to_string(),
            ))
        }
        (Err(_), _) if raw.is_absolute() => raw.to_path_buf(),
        (Err(_), _) => cwd.join(raw),
    };
    normalize(&expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_dots() {
        let path = normalize(Path::new("/var/./log/../tmp//x")).unwrap();
        assert_eq!(path, PathBuf::from("/var/tmp/x"));

        let path = normalize(Path::new("/../..")).unwrap();
        assert_eq!(path, PathBuf::from("/"));
    }

    #[test]
    fn test_normalize_rejects_relative_paths() {
        let err = normalize(Path::new("relative/path")).unwrap_err();
        assert!(matches!(err, FileError::InvalidArgument(_)));
    }

    #[test]
    fn test_join_treats_pieces_as_relative() {
        let path = join(Path::new("/srv"), ["www", "/html", "../static"]).unwrap();
        assert_eq!(path, PathBuf::from("/srv/www/static"));
        assert!(join(Path::new("/srv"), [""]).is_err());
    }

    #[test]
    fn test_relative_path_between_siblings() {
        let rel = relative_path(Path::new("/a/b/c"), Path::new("/a/d/e.txt")).unwrap();
        assert_eq!(rel, PathBuf::from("../../d/e.txt"));

        let rel = relative_path(Path::new("/a"), Path::new("/a")).unwrap();
        assert_eq!(rel, PathBuf::from("."));
    }

    #[test]
    fn test_absolutize_expands_home() {
        let cwd = Path::new("/work");
        let home = Path::new("/home/me");

        assert_eq!(
            absolutize(Path::new("~/notes"), cwd, Some(home)).unwrap(),
            PathBuf::from("/home/me/notes")
        );
        assert_eq!(
            absolutize(Path::new("src/../docs"), cwd, Some(home)).unwrap(),
            PathBuf::from("/work/docs")
        );
    }
}
