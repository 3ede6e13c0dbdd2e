use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::Path;

/// Write `bytes` to a `.tmp` sibling, fsync it, then rename it over `path`.
/// Missing parent directories are created. A reader sees either the old
/// file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_parents_and_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a").join("b").join("doc.json");

        write_atomic(&path, b"{}\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn replaces_existing_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        fs::write(&path, "a much longer previous body").unwrap();

        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn stale_temp_file_is_overwritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc.json");
        fs::write(path.with_extension("tmp"), "{ half").unwrap();

        write_atomic(&path, b"[1]").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[1]");
        assert!(!path.with_extension("tmp").exists());
    }
}
