use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Persistent home of the user-adjusted stroke length.
pub trait SettingsStore: Send + Sync {
    /// `None` when nothing has been saved yet.
    fn load_stroke_degrees(&self) -> Result<Option<f64>, SettingsError>;
    fn save_stroke_degrees(&self, stroke_degrees: f64) -> Result<(), SettingsError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stroke_degrees: Option<f64>,
}

/// Settings kept in a small YAML file.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: PathBuf) -> Self {
        FileSettings { path }
    }

    fn read(&self) -> Result<StoredSettings, SettingsError> {
        if !self.path.exists() {
            return Ok(StoredSettings::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(StoredSettings::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }
}

impl SettingsStore for FileSettings {
    fn load_stroke_degrees(&self) -> Result<Option<f64>, SettingsError> {
        Ok(self.read()?.stroke_degrees)
    }

    fn save_stroke_degrees(&self, stroke_degrees: f64) -> Result<(), SettingsError> {
        let mut stored = self.read()?;
        stored.stroke_degrees = Some(stroke_degrees);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_yaml::to_string(&stored)?)?;
        log::info!(
            "Saved stroke of {:.2} deg to {}",
            stroke_degrees,
            self.path.display()
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySettings {
    stroke_degrees: Mutex<Option<f64>>,
}

impl MemorySettings {
    pub fn new(stroke_degrees: Option<f64>) -> Self {
        MemorySettings {
            stroke_degrees: Mutex::new(stroke_degrees),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn load_stroke_degrees(&self) -> Result<Option<f64>, SettingsError> {
        Ok(*self
            .stroke_degrees
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner))
    }

    fn save_stroke_degrees(&self, stroke_degrees: f64) -> Result<(), SettingsError> {
        *self
            .stroke_degrees
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(stroke_degrees);
        Ok(())
    }
}
