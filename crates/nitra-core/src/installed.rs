//! Snapshot of what is already present in the local ComfyUI install.
//!
//! The live node-type registry comes from the running editor; the folder
//! and model listings can be produced here by scanning a ComfyUI root.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::error::{NitraError, Result};
use crate::matching::{has_model_extension, strip_extension};

/// Installed-state inputs for both matchers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledState {
    /// Node types registered in the running editor (compared verbatim).
    #[serde(default)]
    pub node_types: HashSet<String>,
    /// Lowercase directory names under `custom_nodes`.
    #[serde(default)]
    pub folders: HashSet<String>,
    /// Model basenames without extension.
    #[serde(default)]
    pub model_names: HashSet<String>,
}

impl InstalledState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `<comfyui_root>/custom_nodes` and `<comfyui_root>/models`.
    ///
    /// Node types are not on disk; supply them with [`Self::with_node_types`].
    pub fn scan(comfyui_root: impl AsRef<Path>) -> Result<Self> {
        let root = comfyui_root.as_ref();
        let folders = scan_custom_node_folders(root.join(ScanConfig::CUSTOM_NODES_DIR_NAME))?;
        let models = scan_model_files(root.join(ScanConfig::MODELS_DIR_NAME))?;
        Ok(Self {
            node_types: HashSet::new(),
            folders,
            model_names: models.names,
        })
    }

    pub fn with_node_types<T: Into<String>>(
        mut self,
        node_types: impl IntoIterator<Item = T>,
    ) -> Self {
        self.node_types.extend(node_types.into_iter().map(Into::into));
        self
    }

    pub fn with_folders<T: AsRef<str>>(mut self, folders: impl IntoIterator<Item = T>) -> Self {
        self.folders
            .extend(folders.into_iter().map(|f| f.as_ref().to_lowercase()));
        self
    }

    pub fn with_model_names<T: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = T>,
    ) -> Self {
        self.model_names.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Model files found under a models directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledModels {
    /// Basenames without extension.
    pub names: HashSet<String>,
    /// Full file names, sorted.
    pub files: Vec<String>,
}

/// List installed custom node packages as lowercase directory names.
///
/// Hidden directories and plain files are skipped. A missing directory is
/// an empty listing.
pub fn scan_custom_node_folders(custom_nodes_dir: impl AsRef<Path>) -> Result<HashSet<String>> {
    let dir = custom_nodes_dir.as_ref();
    if !dir.exists() {
        debug!("Custom nodes directory does not exist: {}", dir.display());
        return Ok(HashSet::new());
    }
    if !dir.is_dir() {
        return Err(NitraError::NotADirectory(dir.to_path_buf()));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| NitraError::io_with_path(e, dir))?;

    let mut folders = HashSet::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to read directory entry: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };
        if name.starts_with('.') {
            continue;
        }

        folders.insert(name.to_lowercase());
    }

    debug!("Found {} custom node folders in {}", folders.len(), dir.display());
    Ok(folders)
}

/// Recursively list model files under a models directory.
///
/// Generic shard/config names in [`ScanConfig::IGNORED_MODEL_NAMES`] are
/// left out since they would match almost anything. Symlinked files are
/// listed but symlinked directories are not descended into. A missing
/// directory is an empty listing.
pub fn scan_model_files(models_dir: impl AsRef<Path>) -> Result<InstalledModels> {
    let dir = models_dir.as_ref();
    if !dir.exists() {
        debug!("Models directory does not exist: {}", dir.display());
        return Ok(InstalledModels::default());
    }
    if !dir.is_dir() {
        return Err(NitraError::NotADirectory(dir.to_path_buf()));
    }

    let mut models = InstalledModels::default();
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(e) => {
                warn!("Skipping unreadable path under {}: {}", dir.display(), e);
                continue;
            }
        };
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().to_string();
        if !has_model_extension(&file_name) {
            continue;
        }

        let base_name = strip_extension(&file_name);
        if ScanConfig::IGNORED_MODEL_NAMES.contains(&base_name.to_lowercase().as_str()) {
            continue;
        }

        models.names.insert(base_name);
        models.files.push(file_name);
    }

    models.files.sort();
    debug!("Found {} model files in {}", models.files.len(), dir.display());
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_scan_custom_node_folders() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("custom_nodes");
        std::fs::create_dir_all(dir.join("ComfyUI-Impact-Pack")).unwrap();
        std::fs::create_dir_all(dir.join(".disabled")).unwrap();
        touch(&dir.join("example_node.py.example"));

        let folders = scan_custom_node_folders(&dir).unwrap();
        assert_eq!(folders.len(), 1);
        assert!(folders.contains("comfyui-impact-pack"));
    }

    #[test]
    fn test_scan_missing_dirs_are_empty() {
        let temp = TempDir::new().unwrap();
        assert!(scan_custom_node_folders(temp.path().join("nope"))
            .unwrap()
            .is_empty());
        assert!(scan_model_files(temp.path().join("nope"))
            .unwrap()
            .files
            .is_empty());
    }

    #[test]
    fn test_scan_file_instead_of_dir() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("custom_nodes");
        touch(&file);
        assert!(matches!(
            scan_custom_node_folders(&file),
            Err(NitraError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_scan_model_files_recursive_and_filtered() {
        let temp = TempDir::new().unwrap();
        let models = temp.path().join("models");
        touch(&models.join("checkpoints/sd_xl_base_1.0.safetensors"));
        touch(&models.join("loras/style/detail.PT"));
        touch(&models.join("unet/diffusion_pytorch_model.safetensors"));
        touch(&models.join("vae/readme.md"));

        let found = scan_model_files(&models).unwrap();
        assert_eq!(
            found.files,
            vec!["detail.PT".to_string(), "sd_xl_base_1.0.safetensors".to_string()]
        );
        assert!(found.names.contains("sd_xl_base_1.0"));
        assert!(found.names.contains("detail"));
        assert!(!found.names.contains("diffusion_pytorch_model"));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_model_files_does_not_follow_dir_symlinks() {
        use std::os::unix::fs::symlink;

        let temp = TempDir::new().unwrap();
        let shared = temp.path().join("shared");
        touch(&shared.join("linked_dir_model.safetensors"));
        touch(&shared.join("linked_file_model.ckpt"));

        let models = temp.path().join("models");
        std::fs::create_dir_all(models.join("checkpoints")).unwrap();
        symlink(&shared, models.join("loras")).unwrap();
        symlink(
            shared.join("linked_file_model.ckpt"),
            models.join("checkpoints/linked_file_model.ckpt"),
        )
        .unwrap();

        let found = scan_model_files(&models).unwrap();
        assert_eq!(found.files, vec!["linked_file_model.ckpt".to_string()]);
        assert!(!found.names.contains("linked_dir_model"));
    }

    #[test]
    fn test_installed_state_scan() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("custom_nodes/rgthree-comfy")).unwrap();
        touch(&temp.path().join("models/loras/myLora.safetensors"));

        let state = InstalledState::scan(temp.path())
            .unwrap()
            .with_node_types(["KSampler"]);
        assert!(state.folders.contains("rgthree-comfy"));
        assert!(state.model_names.contains("myLora"));
        assert!(state.node_types.contains("KSampler"));
    }

    #[test]
    fn test_with_folders_lowercases() {
        let state = InstalledState::new().with_folders(["WAS-Node-Suite"]);
        assert!(state.folders.contains("was-node-suite"));
    }
}
