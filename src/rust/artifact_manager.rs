use std::env;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::ArtifactError;

pub const PRODUCT_MODEL_FILE: &str = "product_model.onnx";
pub const QUANTITY_MODEL_FILE: &str = "quantity_model.onnx";
pub const ENCODERS_FILE: &str = "encoders.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// One file of the artifacts directory, as listed in `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    /// File name relative to the artifacts directory
    pub file: String,
    /// Expected lowercase hex SHA-256 digest
    #[serde(default)]
    pub sha256: Option<String>,
    /// Where to fetch the file from when it is missing or corrupted
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub artifacts: Vec<ArtifactInfo>,
}

impl Manifest {
    pub fn get(&self, file: &str) -> Option<&ArtifactInfo> {
        self.artifacts.iter().find(|a| a.file == file)
    }
}

/// Locates, verifies and fetches the model artifacts.
#[derive(Clone)]
pub struct ArtifactManager {
    artifacts_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl ArtifactManager {
    /// Creates a new ArtifactManager with the default artifacts directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_artifacts_dir())
    }

    /// Returns the default artifacts directory path
    pub fn get_default_artifacts_dir() -> PathBuf {
        // 1. Check environment variable
        if let Ok(path) = env::var("SALESCAST_HOME") {
            return PathBuf::from(path).join("models");
        }

        // 2. Use platform-specific data directory
        if let Some(data_dir) = dirs::data_dir() {
            return data_dir.join("salescast").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".local").join("share").join("salescast").join("models");
        }

        // 4. If all else fails, use system temp directory (platform agnostic)
        env::temp_dir().join("salescast").join("models")
    }

    pub fn new<P: AsRef<Path>>(artifacts_dir: P) -> io::Result<Self> {
        let artifacts_dir = artifacts_dir.as_ref().to_path_buf();
        fs::create_dir_all(&artifacts_dir)?;
        Ok(Self {
            artifacts_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    fn get_path(&self, file: &str) -> PathBuf {
        self.artifacts_dir.join(file)
    }

    /// Resolves a manifest file name. Only plain relative components are
    /// accepted, so the result always stays inside the artifacts directory.
    pub fn artifact_path(&self, file: &str) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(file);
        let plain = !file.is_empty() && relative.components().all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(ArtifactError::InvalidPath(file.to_string()));
        }
        Ok(self.artifacts_dir.join(relative))
    }

    pub fn product_model_path(&self) -> PathBuf {
        self.get_path(PRODUCT_MODEL_FILE)
    }

    pub fn quantity_model_path(&self) -> PathBuf {
        self.get_path(QUANTITY_MODEL_FILE)
    }

    pub fn encoders_path(&self) -> PathBuf {
        self.get_path(ENCODERS_FILE)
    }

    pub fn is_present(&self, file: &str) -> bool {
        let path = self.get_path(file);
        log::debug!("Checking artifact {:?} (exists: {})", path, path.exists());
        path.exists()
    }

    /// Both model files are present
    pub fn are_models_present(&self) -> bool {
        self.is_present(PRODUCT_MODEL_FILE) && self.is_present(QUANTITY_MODEL_FILE)
    }

    /// Reads `manifest.json`; a missing manifest is an empty one.
    pub fn load_manifest(&self) -> Result<Manifest, ArtifactError> {
        let path = self.get_path(MANIFEST_FILE);
        if !path.exists() {
            log::info!("No manifest at {:?}, skipping verification", path);
            return Ok(Manifest::default());
        }
        let contents = fs::read_to_string(&path)?;
        let manifest: Manifest = serde_json::from_str(&contents)?;
        for info in &manifest.artifacts {
            self.artifact_path(&info.file)?;
        }
        Ok(manifest)
    }

    fn hash_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    pub fn verify_file(&self, path: &Path, expected_hash: &str) -> Result<bool, ArtifactError> {
        log::info!("Verifying file: {:?}", path);
        let bytes = fs::read(path)?;
        let hash = Self::hash_bytes(&bytes);
        log::debug!("Calculated hash: {}", hash);
        log::debug!("Expected hash:   {}", expected_hash);
        Ok(hash.eq_ignore_ascii_case(expected_hash))
    }

    /// Checks that an artifact exists and, when the manifest gives a digest, matches it.
    pub fn verify_artifact(&self, info: &ArtifactInfo) -> Result<bool, ArtifactError> {
        let path = self.artifact_path(&info.file)?;
        if !path.exists() {
            log::info!("Artifact {:?} does not exist", path);
            return Ok(false);
        }
        match &info.sha256 {
            Some(expected) => self.verify_file(&path, expected),
            None => Ok(true),
        }
    }

    /// Fetches an artifact and writes it only once its digest checks out.
    async fn download_and_verify_file(&self, info: &ArtifactInfo, url: &str) -> Result<(), ArtifactError> {
        let path = self.artifact_path(&info.file)?;
        log::info!("Downloading {} from {} to {:?}", info.file, url, path);
        let response = reqwest::get(url).await?.error_for_status()?;
        log::info!("Download response status: {}", response.status());
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        if let Some(expected) = &info.sha256 {
            let hash = Self::hash_bytes(&bytes);
            if !hash.eq_ignore_ascii_case(expected) {
                log::error!("{} hash mismatch: expected {}, got {}", info.file, expected, hash);
                return Err(ArtifactError::HashMismatch {
                    file: info.file.clone(),
                    expected: expected.clone(),
                    actual: hash,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        log::info!("{} downloaded and verified successfully", info.file);
        Ok(())
    }

    /// Ensures that an artifact is present and verified.
    /// If it is missing or fails verification and has a URL, it is (re-)downloaded.
    pub async fn ensure_artifact(&self, info: &ArtifactInfo) -> Result<(), ArtifactError> {
        let _lock = self.download_lock.lock().await;

        if self.verify_artifact(info)? {
            log::info!("Artifact {} verified", info.file);
            return Ok(());
        }

        let path = self.artifact_path(&info.file)?;
        match &info.url {
            Some(url) => {
                if path.exists() {
                    log::warn!("Artifact {} failed verification, redownloading", info.file);
                }
                self.download_and_verify_file(info, url).await
            }
            None if path.exists() => {
                let expected = info.sha256.clone().unwrap_or_default();
                let actual = Self::hash_bytes(&fs::read(&path)?);
                Err(ArtifactError::HashMismatch {
                    file: info.file.clone(),
                    expected,
                    actual,
                })
            }
            None => Err(ArtifactError::NotFound(path.display().to_string())),
        }
    }

    /// Ensures every artifact listed in the manifest, then checks the models are present.
    pub async fn ensure_artifacts(&self) -> Result<Manifest, ArtifactError> {
        let manifest = self.load_manifest()?;
        for info in &manifest.artifacts {
            self.ensure_artifact(info).await?;
        }
        for file in [PRODUCT_MODEL_FILE, QUANTITY_MODEL_FILE] {
            if !self.is_present(file) {
                return Err(ArtifactError::NotFound(self.get_path(file).display().to_string()));
            }
        }
        Ok(manifest)
    }

    /// Checks the manifest and the model files without fetching anything.
    pub fn verify_artifacts(&self) -> Result<Manifest, ArtifactError> {
        let manifest = self.load_manifest()?;
        for info in &manifest.artifacts {
            if !self.verify_artifact(info)? {
                let path = self.artifact_path(&info.file)?;
                if !path.exists() {
                    return Err(ArtifactError::NotFound(path.display().to_string()));
                }
                return Err(ArtifactError::HashMismatch {
                    file: info.file.clone(),
                    expected: info.sha256.clone().unwrap_or_default(),
                    actual: Self::hash_bytes(&fs::read(&path)?),
                });
            }
        }
        for file in [PRODUCT_MODEL_FILE, QUANTITY_MODEL_FILE] {
            if !self.is_present(file) {
                return Err(ArtifactError::NotFound(self.get_path(file).display().to_string()));
            }
        }
        Ok(manifest)
    }

    pub fn remove_artifact(&self, file: &str) -> Result<(), ArtifactError> {
        let path = self.artifact_path(file)?;
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}
