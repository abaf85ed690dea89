use std::fs;
use std::path::{Path, PathBuf};

use seq_transport::SampleSelector;

use crate::notes::piano_sample_file_name;

pub const DEFAULT_SOUNDS_DIR: &str = "sounds";

/// Extensions listed as selectable samples.
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "flac", "ogg"];

/// A sounds directory laid out as `<root>/<folder>/<file>`.
#[derive(Debug, Clone)]
pub struct SampleLibrary {
    root: PathBuf,
}

impl Default for SampleLibrary {
    fn default() -> Self {
        Self::new(DEFAULT_SOUNDS_DIR)
    }
}

impl SampleLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sample folders, sorted by name. A missing root lists nothing.
    pub fn list_folders(&self) -> anyhow::Result<Vec<String>> {
        if !self.root.is_dir() {
            tracing::warn!(root = %self.root.display(), "sounds directory does not exist");
            return Ok(Vec::new());
        }

        let mut folders = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                folders.push(name.to_string());
            }
        }
        folders.sort();
        Ok(folders)
    }

    /// Audio files in `folder`, sorted by name.
    pub fn list_files(&self, folder: &str) -> anyhow::Result<Vec<String>> {
        let dir = self.root.join(folder);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || !is_audio_file(&path) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                files.push(name.to_string());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Path of a drum sample, `None` when no file is selected.
    ///
    /// Absolute selections are used as they are.
    pub fn drum_sample_path(&self, selector: &SampleSelector) -> Option<PathBuf> {
        let file = selector.file.as_deref()?;
        let direct = Path::new(file);
        if direct.is_absolute() {
            return Some(direct.to_path_buf());
        }
        Some(self.root.join(&selector.folder).join(file))
    }

    /// Path of the per-note sample for a piano-roll row.
    pub fn piano_sample_path(&self, instrument_folder: &str, row: u8) -> PathBuf {
        self.root
            .join(instrument_folder)
            .join(piano_sample_file_name(row))
    }
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_list_folders_sorted() {
        let dir = tempdir().unwrap();
        for name in ["misc", "claps", "kicks"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("readme.txt"), "hi").unwrap();

        let library = SampleLibrary::new(dir.path());
        assert_eq!(library.list_folders().unwrap(), vec!["claps", "kicks", "misc"]);
    }

    #[test]
    fn test_list_files_filters_extensions() {
        let dir = tempdir().unwrap();
        let kicks = dir.path().join("kicks");
        fs::create_dir(&kicks).unwrap();
        for name in ["hardcoreKick.wav", "basicKick.WAV", "notes.txt", "loop.flac"] {
            fs::write(kicks.join(name), b"").unwrap();
        }
        fs::create_dir(kicks.join("nested.wav")).unwrap();

        let library = SampleLibrary::new(dir.path());
        assert_eq!(
            library.list_files("kicks").unwrap(),
            vec!["basicKick.WAV", "hardcoreKick.wav", "loop.flac"]
        );
        assert!(library.list_files("missing").unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let library = SampleLibrary::new("/definitely/not/here");
        assert!(library.list_folders().unwrap().is_empty());
    }

    #[test]
    fn test_paths() {
        let library = SampleLibrary::new("sounds");
        assert_eq!(
            library.drum_sample_path(&SampleSelector::new("kicks", "basicKick.wav")),
            Some(PathBuf::from("sounds/kicks/basicKick.wav"))
        );
        assert_eq!(library.drum_sample_path(&SampleSelector::folder("kicks")), None);
        assert_eq!(
            library.piano_sample_path("synth", 0),
            PathBuf::from("sounds/synth/c8.wav")
        );
    }
}
