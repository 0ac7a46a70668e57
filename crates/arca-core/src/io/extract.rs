//! Archive extraction module
//!
//! Handles zip-family (`.zip`, `.nupkg`) and tar-family (`.tar`, `.tar.gz`,
//! `.tgz`) archives. Entries that would land outside the destination are
//! rejected.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;

/// Errors raised while expanding an artifact.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Reading the archive or writing its entries failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The archive is corrupt or in an unsupported layout.
    #[error("Archive error: {0}")]
    Archive(String),

    /// An entry would land outside the destination.
    #[error("Invalid path in archive: {0}")]
    UnsafePath(String),
}

/// How an artifact is laid out on disk when expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `.zip` and `.nupkg`.
    Zip,
    /// `.tar.gz` and `.tgz`.
    TarGz,
    /// Uncompressed `.tar`.
    Tar,
    /// Not an archive; copied as a single file.
    Plain,
}

/// Detect the archive kind from a file name.
pub fn detect_kind(file_name: &str) -> ArchiveKind {
    let name = file_name.to_ascii_lowercase();
    if name.ends_with(".zip") || name.ends_with(".nupkg") {
        ArchiveKind::Zip
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        ArchiveKind::TarGz
    } else if name.ends_with(".tar") {
        ArchiveKind::Tar
    } else {
        ArchiveKind::Plain
    }
}

/// Expand `archive_path` into `dest_dir`, returning the files written
/// relative to `dest_dir`.
///
/// A plain file is copied into `dest_dir` under `file_name`.
pub fn extract_auto(
    archive_path: &Path,
    file_name: &str,
    dest_dir: &Path,
) -> Result<Vec<PathBuf>, ExtractError> {
    match detect_kind(file_name) {
        ArchiveKind::Zip => extract_zip(archive_path, dest_dir),
        ArchiveKind::TarGz => {
            let reader = BufReader::new(File::open(archive_path)?);
            extract_tar(flate2::read::GzDecoder::new(reader), dest_dir)
        }
        ArchiveKind::Tar => extract_tar(BufReader::new(File::open(archive_path)?), dest_dir),
        ArchiveKind::Plain => {
            let relative = safe_relative(Path::new(file_name))?;
            fs::create_dir_all(dest_dir)?;
            fs::copy(archive_path, dest_dir.join(&relative))?;
            Ok(vec![relative])
        }
    }
}

/// Extract a tar stream. Only regular files and directories are written.
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    let mut extracted = Vec::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let relative = safe_relative(&entry.path()?)?;
        let kind = entry.header().entry_type();

        if kind.is_dir() {
            fs::create_dir_all(dest_dir.join(&relative))?;
            continue;
        }
        if !kind.is_file() {
            tracing::debug!("Skipping non-file tar entry {}", relative.display());
            continue;
        }

        let absolute = dest_dir.join(&relative);
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&absolute)?;
        extracted.push(relative);
    }

    Ok(extracted)
}

/// Extract a zip archive
fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;

    fs::create_dir_all(dest_dir)?;
    let mut extracted = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let relative = match file.enclosed_name() {
            Some(path) => path,
            None => return Err(ExtractError::UnsafePath(file.name().to_string())),
        };

        if file.is_dir() {
            fs::create_dir_all(dest_dir.join(&relative))?;
            continue;
        }

        let absolute = dest_dir.join(&relative);
        if let Some(p) = absolute.parent() {
            fs::create_dir_all(p)?;
        }

        let mut outfile = File::create(&absolute)?;
        io::copy(&mut file, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute, fs::Permissions::from_mode(mode & 0o777))?;
        }

        extracted.push(relative);
    }

    Ok(extracted)
}

/// Reduce a path to plain components, rejecting anything that could escape.
fn safe_relative(path: &Path) -> Result<PathBuf, ExtractError> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExtractError::UnsafePath(path.display().to_string()));
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(ExtractError::UnsafePath(path.display().to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
        let gz = flate2::write::GzEncoder::new(
            File::create(path).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(gz);
        for (name, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, body.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(detect_kind("Az.1.0.0.nupkg"), ArchiveKind::Zip);
        assert_eq!(detect_kind("tool.ZIP"), ArchiveKind::Zip);
        assert_eq!(detect_kind("tool-1.0.tar.gz"), ArchiveKind::TarGz);
        assert_eq!(detect_kind("tool.tgz"), ArchiveKind::TarGz);
        assert_eq!(detect_kind("tool.tar"), ArchiveKind::Tar);
        assert_eq!(detect_kind("Tool.ps1"), ArchiveKind::Plain);
    }

    #[test]
    fn test_extract_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("m.nupkg");
        write_zip(&archive, &[("Mod.psd1", "@{}"), ("lib/Mod.dll", "bin")]);

        let out = dir.path().join("out");
        let files = extract_auto(&archive, "m.nupkg", &out).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(fs::read_to_string(out.join("lib/Mod.dll")).unwrap(), "bin");
    }

    #[test]
    fn test_extract_tar_gz() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("t.tar.gz");
        write_tar_gz(&archive, &[("pkg/readme.txt", "hello")]);

        let out = dir.path().join("out");
        let files = extract_auto(&archive, "t.tar.gz", &out).unwrap();
        assert_eq!(files, vec![PathBuf::from("pkg/readme.txt")]);
        assert_eq!(fs::read_to_string(out.join("pkg/readme.txt")).unwrap(), "hello");
    }

    #[test]
    fn test_zip_traversal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", "x")]);

        let out = dir.path().join("out");
        let err = extract_auto(&archive, "evil.zip", &out).unwrap_err();
        assert!(matches!(err, ExtractError::UnsafePath(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_tar_traversal_is_rejected() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.tar");
        {
            let mut builder = tar::Builder::new(File::create(&archive).unwrap());
            let mut header = tar::Header::new_old();
            let name = b"../escape.txt";
            header.as_old_mut().name[..name.len()].copy_from_slice(name);
            header.set_size(1);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, &b"x"[..]).unwrap();
            builder.finish().unwrap();
        }

        let out = dir.path().join("out");
        let err = extract_auto(&archive, "evil.tar", &out).unwrap_err();
        assert!(matches!(err, ExtractError::UnsafePath(_)));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_plain_file_is_copied() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("download");
        fs::write(&script, "Write-Output 1").unwrap();

        let out = dir.path().join("out");
        let files = extract_auto(&script, "Tool.ps1", &out).unwrap();
        assert_eq!(files, vec![PathBuf::from("Tool.ps1")]);
        assert!(out.join("Tool.ps1").exists());
    }
}
