//! Utilities (script loading, unicode helpers).

pub mod unicode;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// Script text plus where it came from, so the terminal UI can reload it.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub label: String,
    pub path: Option<PathBuf>,
    pub text: String,
}

impl ScriptSource {
    pub fn inline(text: impl Into<String>) -> Self {
        Self { label: "<eval>".into(), path: None, text: text.into() }
    }

    pub fn from_stdin() -> Result<Self> {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text).context("failed to read script from stdin")?;
        Ok(Self { label: "<stdin>".into(), path: None, text })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = read_script(path)?;
        Ok(Self { label: path.display().to_string(), path: Some(path.to_path_buf()), text })
    }

    /// Re-read the file, if there is one. Returns whether the text changed.
    pub fn reload(&mut self) -> Result<bool> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let text = read_script(path)?;
        let changed = text != self.text;
        self.text = text;
        Ok(changed)
    }
}

fn read_script(path: &Path) -> Result<String> {
    // Check if file exists
    if !path.exists() {
        bail!("Script file '{}' does not exist", path.display());
    }

    // Check if it's a file (not directory)
    if !path.is_file() {
        bail!("'{}' is not a file", path.display());
    }

    fs::read_to_string(path).with_context(|| format!("Failed to read file '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_picks_up_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.js");
        fs::write(&path, "console.log(1)").unwrap();

        let mut source = ScriptSource::from_path(&path).unwrap();
        assert_eq!(source.text, "console.log(1)");
        assert!(!source.reload().unwrap());

        fs::write(&path, "console.log(2)").unwrap();
        assert!(source.reload().unwrap());
        assert_eq!(source.text, "console.log(2)");
    }

    #[test]
    fn missing_and_directory_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ScriptSource::from_path(&dir.path().join("nope.js")).is_err());
        assert!(ScriptSource::from_path(dir.path()).is_err());
    }

    #[test]
    fn inline_sources_do_not_reload() {
        let mut source = ScriptSource::inline("1");
        assert!(!source.reload().unwrap());
        assert_eq!(source.label, "<eval>");
    }
}
