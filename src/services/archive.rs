use crate::services::transport::TransportError;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use regex::Regex;
use std::fs;
use std::io::{Cursor, Read, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// One file of a plugin bundle, addressed relative to the folder that holds the bundles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// `/`-separated path whose first component is the bundle folder, e.g. `dm-LFO.lv2/manifest.ttl`
    pub path: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }
}

/// A zip payload ready for upload, with the bundle folders it contains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    pub payload: Vec<u8>,
    /// Distinct bundle folder names in first-seen order, e.g. `dm-LFO.lv2`
    pub names: Vec<String>,
}

/// Problems with files the user picked. Nothing has been sent anywhere yet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Select folders instead of files please.")]
    NotAFolder,

    #[error("Only the following file types are allowed: \"{}\".", .allowed.join(","))]
    DisallowedType { allowed: Vec<String> },

    #[error("No files were selected.")]
    Empty,

    #[error("Could not read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Could not package files: {0}")]
    Packaging(String),
}

/// Splits a relative path into its bundle folder and the rest
static ROOT_PATTERN: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"^/*([^/]+)/(.+)$").expect("Invalid bundle path regex"));

/// Turns picked bundle folders into an uploadable archive.
#[derive(Debug, Clone)]
pub struct ArchivePackager {
    allowed_suffixes: Vec<String>,
}

impl Default for ArchivePackager {
    fn default() -> Self {
        Self::new([".lv2"])
    }
}

impl ArchivePackager {
    pub fn new<I, S>(allowed_suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_suffixes: allowed_suffixes.into_iter().map(Into::into).collect(),
        }
    }

    fn disallowed(&self) -> ValidationError {
        ValidationError::DisallowedType {
            allowed: self.allowed_suffixes.clone(),
        }
    }

    /// Bundle folder of a relative path.
    ///
    /// A path without a folder is a loose file; a folder without an allowed
    /// suffix is the wrong type.
    pub fn bundle_name<'a>(&self, path: &'a str) -> Result<&'a str, ValidationError> {
        let captures = ROOT_PATTERN.captures(path).ok_or(ValidationError::NotAFolder)?;
        let root = captures.get(1).map(|m| m.as_str()).ok_or(ValidationError::NotAFolder)?;

        if self.allowed_suffixes.iter().any(|suffix| root.ends_with(suffix.as_str()) && root.len() > suffix.len()) {
            Ok(root)
        } else {
            Err(self.disallowed())
        }
    }

    /// Validate entries and zip them with deflate
    pub fn package_files(&self, files: &[ArchiveEntry]) -> Result<PackagedArchive, ValidationError> {
        if files.is_empty() {
            return Err(ValidationError::Empty);
        }

        // Validate everything before writing anything
        let mut names: Vec<String> = Vec::new();
        for file in files {
            let bundle = self.bundle_name(&file.path)?;
            if !names.iter().any(|name| name == bundle) {
                names.push(bundle.to_string());
            }
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for file in files {
            let path = file.path.trim_start_matches('/');
            zip.start_file(path, options)
                .map_err(|e| ValidationError::Packaging(e.to_string()))?;
            zip.write_all(&file.bytes)
                .map_err(|e| ValidationError::Packaging(e.to_string()))?;
        }

        let payload = zip
            .finish()
            .map_err(|e| ValidationError::Packaging(e.to_string()))?
            .into_inner();

        tracing::debug!("Packaged {} files from {} bundles ({} bytes)", files.len(), names.len(), payload.len());
        Ok(PackagedArchive { payload, names })
    }

    /// Read a bundle folder from disk into entries rooted at the folder's name
    pub fn collect_folder(&self, folder: &Utf8Path) -> Result<Vec<ArchiveEntry>, ValidationError> {
        let metadata = fs::metadata(folder).map_err(|e| ValidationError::Unreadable {
            path: folder.to_string(),
            reason: e.to_string(),
        })?;
        if !metadata.is_dir() {
            return Err(ValidationError::NotAFolder);
        }

        let root = folder.file_name().ok_or(ValidationError::NotAFolder)?;
        if !self.allowed_suffixes.iter().any(|suffix| root.ends_with(suffix.as_str())) {
            return Err(self.disallowed());
        }

        let mut entries = Vec::new();
        collect_recursive(folder, &Utf8PathBuf::from(root), &mut entries)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

fn collect_recursive(
    dir: &Utf8Path,
    relative: &Utf8Path,
    entries: &mut Vec<ArchiveEntry>,
) -> Result<(), ValidationError> {
    let unreadable = |path: &Utf8Path, e: std::io::Error| ValidationError::Unreadable {
        path: path.to_string(),
        reason: e.to_string(),
    };

    for entry in dir.read_dir_utf8().map_err(|e| unreadable(dir, e))? {
        let entry = entry.map_err(|e| unreadable(dir, e))?;
        let file_type = entry.file_type().map_err(|e| unreadable(entry.path(), e))?;
        let relative_path = relative.join(entry.file_name());

        if file_type.is_dir() {
            collect_recursive(entry.path(), &relative_path, entries)?;
        } else if file_type.is_file() {
            let bytes = fs::read(entry.path()).map_err(|e| unreadable(entry.path(), e))?;
            entries.push(ArchiveEntry::new(relative_path.as_str().replace('\\', "/"), bytes));
        }
        // Symlinks are skipped
    }

    Ok(())
}

/// Read every file of a zip payload. Entries that would escape the archive root are rejected.
pub fn unpack(payload: &[u8]) -> Result<Vec<ArchiveEntry>, TransportError> {
    let mut archive =
        ZipArchive::new(Cursor::new(payload)).map_err(|e| TransportError::Archive(e.to_string()))?;

    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| TransportError::Archive(e.to_string()))?;
        if file.is_dir() {
            continue;
        }

        let path = file
            .enclosed_name()
            .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
            .ok_or_else(|| TransportError::Archive(format!("Unsafe path in archive: {}", file.name())))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        entries.push(ArchiveEntry::new(to_slash(&path), bytes));
    }

    Ok(entries)
}

/// Pull one bundle out of a release archive.
///
/// Release assets are zip, tar or gzipped tar files that hold bundles, possibly
/// below a folder named after the asset. Returned entries start at the bundle folder.
pub fn extract_bundle(archive: &[u8], bundle: &str) -> Result<Vec<ArchiveEntry>, TransportError> {
    let files = if archive.starts_with(b"PK\x03\x04") {
        unpack(archive)?
    } else if archive.starts_with(&[0x1f, 0x8b]) {
        read_tar(GzDecoder::new(archive))?
    } else {
        read_tar(archive)?
    };

    let entries: Vec<ArchiveEntry> = files
        .into_iter()
        .filter_map(|entry| {
            let path = Utf8Path::new(&entry.path);
            let components: Vec<&str> = path.components().map(|c| c.as_str()).collect();
            let start = components.iter().position(|component| *component == bundle)?;
            Some(ArchiveEntry::new(components[start..].join("/"), entry.bytes))
        })
        .collect();

    if entries.is_empty() {
        return Err(TransportError::Archive(format!("{} not found in release archive", bundle)));
    }
    Ok(entries)
}

fn read_tar<R: Read>(reader: R) -> Result<Vec<ArchiveEntry>, TransportError> {
    let mut archive = tar::Archive::new(reader);
    let mut entries = Vec::new();

    for entry in archive.entries().map_err(|e| TransportError::Archive(e.to_string()))? {
        let mut entry = entry.map_err(|e| TransportError::Archive(e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .ok()
            .and_then(|path| Utf8PathBuf::from_path_buf(path.into_owned()).ok())
            .filter(|path| is_enclosed(path))
            .ok_or_else(|| TransportError::Archive("Unsafe path in archive".to_string()))?;

        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        entries.push(ArchiveEntry::new(to_slash(&path), bytes));
    }

    Ok(entries)
}

fn is_enclosed(path: &Utf8Path) -> bool {
    path.components()
        .all(|component| matches!(component, Utf8Component::Normal(_) | Utf8Component::CurDir))
}

fn to_slash(path: &Utf8Path) -> String {
    path.components()
        .filter(|component| matches!(component, Utf8Component::Normal(_)))
        .map(|component| component.as_str())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lfo_files() -> Vec<ArchiveEntry> {
        vec![
            ArchiveEntry::new("/dm-LFO.lv2/manifest.ttl", b"@prefix lv2:".to_vec()),
            ArchiveEntry::new("/dm-LFO.lv2/dm-LFO.so", vec![0u8; 64]),
            ArchiveEntry::new("dm-Stutter.lv2/modgui/icon.html", b"<div/>".to_vec()),
            ArchiveEntry::new("dm-LFO.lv2/dm-LFO.ttl", b"a lv2:Plugin".to_vec()),
        ]
    }

    #[test]
    fn test_package_names_first_seen_order() {
        let packaged = ArchivePackager::default().package_files(&lfo_files()).unwrap();

        assert_eq!(packaged.names, vec!["dm-LFO.lv2", "dm-Stutter.lv2"]);
        assert!(packaged.payload.starts_with(b"PK"));
    }

    #[test]
    fn test_unpack_restores_entries() {
        let packaged = ArchivePackager::default().package_files(&lfo_files()).unwrap();
        let entries = unpack(&packaged.payload).unwrap();

        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].path, "dm-LFO.lv2/manifest.ttl");
        assert_eq!(entries[1].bytes.len(), 64);
    }

    #[test]
    fn test_rejects_loose_files() {
        let files = vec![ArchiveEntry::new("manifest.ttl", b"x".to_vec())];
        let err = ArchivePackager::default().package_files(&files).unwrap_err();

        assert_eq!(err, ValidationError::NotAFolder);
        assert_eq!(err.to_string(), "Select folders instead of files please.");
    }

    #[test]
    fn test_rejects_wrong_bundle_type() {
        let mut files = lfo_files();
        files.push(ArchiveEntry::new("dm-Whammy.vst3/Contents/x", b"x".to_vec()));

        let err = ArchivePackager::default().package_files(&files).unwrap_err();
        assert_eq!(err.to_string(), "Only the following file types are allowed: \".lv2\".");
    }

    #[test]
    fn test_rejects_empty_selection() {
        assert_eq!(
            ArchivePackager::default().package_files(&[]).unwrap_err(),
            ValidationError::Empty
        );
    }

    #[test]
    fn test_bare_suffix_is_not_a_bundle() {
        let packager = ArchivePackager::default();
        assert!(packager.bundle_name(".lv2/manifest.ttl").is_err());
        assert_eq!(packager.bundle_name("a.lv2/b/c.ttl").unwrap(), "a.lv2");
    }

    #[test]
    fn test_unpack_rejects_escaping_paths() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("../evil.lv2/x", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"x").unwrap();
        let payload = zip.finish().unwrap().into_inner();

        assert!(matches!(unpack(&payload), Err(TransportError::Archive(_))));
    }

    #[test]
    fn test_collect_folder() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let bundle = root.join("dm-LFO.lv2");
        fs::create_dir_all(bundle.join("modgui")).unwrap();
        fs::write(bundle.join("manifest.ttl"), "m").unwrap();
        fs::write(bundle.join("modgui").join("icon.html"), "i").unwrap();

        let entries = ArchivePackager::default().collect_folder(&bundle).unwrap();

        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["dm-LFO.lv2/manifest.ttl", "dm-LFO.lv2/modgui/icon.html"]);
    }

    #[test]
    fn test_collect_folder_rejects_files_and_wrong_types() {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let file = root.join("notes.lv2");
        fs::write(&file, "x").unwrap();
        let wrong = root.join("dm-Whammy.vst3");
        fs::create_dir_all(&wrong).unwrap();

        let packager = ArchivePackager::default();
        assert_eq!(packager.collect_folder(&file).unwrap_err(), ValidationError::NotAFolder);
        assert!(matches!(
            packager.collect_folder(&wrong).unwrap_err(),
            ValidationError::DisallowedType { .. }
        ));
    }

    #[test]
    fn test_extract_bundle_from_nested_tar() {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data) in [
            ("dm-LFO-moddwarf-new/dm-LFO.lv2/manifest.ttl", &b"m"[..]),
            ("dm-LFO-moddwarf-new/dm-LFO.lv2/dm-LFO.so", &b"so"[..]),
            ("dm-LFO-moddwarf-new/README.md", &b"r"[..]),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, data).unwrap();
        }
        let archive = builder.into_inner().unwrap();

        let entries = extract_bundle(&archive, "dm-LFO.lv2").unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "dm-LFO.lv2/manifest.ttl");
        assert!(extract_bundle(&archive, "dm-Whammy.lv2").is_err());
    }

    #[test]
    fn test_extract_bundle_from_zip() {
        let files = vec![ArchiveEntry::new("dm-Stutter.vst3/Contents/x86_64-linux/dm-Stutter.so", b"so".to_vec())];
        let packaged = ArchivePackager::new([".vst3"]).package_files(&files).unwrap();

        let entries = extract_bundle(&packaged.payload, "dm-Stutter.vst3").unwrap();
        assert_eq!(entries[0].path, "dm-Stutter.vst3/Contents/x86_64-linux/dm-Stutter.so");
    }
}
