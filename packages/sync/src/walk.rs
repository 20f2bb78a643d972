//! Enumerating the local source tree.

use std::path::{Path, PathBuf};

/// Recursively lists every regular file under `root`, sorted.
///
/// Returned paths are `root` joined with each file's relative path, so they
/// can be mapped back to keys with [`crate::path::remote_path`]. Symlinked
/// files are included; symlinked directories are not descended into.
///
/// # Errors
///
/// Returns an I/O error if a directory cannot be read.
pub fn local_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect(root, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_nested_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b/c")).unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        std::fs::write(dir.path().join("z.txt"), "z").unwrap();
        std::fs::write(dir.path().join("b/a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("b/c/d.txt"), "d").unwrap();

        let files = local_files(dir.path()).unwrap();

        let relative: Vec<PathBuf> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("b/a.txt"),
                PathBuf::from("b/c/d.txt"),
                PathBuf::from("z.txt"),
            ]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(local_files(&dir.path().join("missing")).is_err());
    }
}
