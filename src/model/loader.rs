//! Model resolution, downloading, and loading utilities.

use std::fmt;
use std::fs;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::{Error, Result};

use super::{Classifier, LoadClassifier, OnnxClassifier};

/// Default file name of the classifier artifact.
pub const MODEL_FILENAME: &str = "model.onnx";

/// Value shipped in deployment templates; treated the same as an unset URL.
pub const PLACEHOLDER_MODEL_URL: &str = "https://your-cloud-storage-url/model.onnx";

/// Where a classifier artifact may be resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    /// A list of candidate paths on local disk.
    Local,
    /// A remote URL, downloaded into the model cache.
    Remote,
}

impl ModelSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" | "url" => Ok(Self::Remote),
            other => Err(format!("unknown model source '{other}' (expected local or remote)")),
        }
    }
}

/// Configuration for model resolution.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Sources to try, in order.
    pub sources: Vec<ModelSource>,

    /// Candidate paths checked by [`ModelSource::Local`], in order.
    pub local_paths: Vec<PathBuf>,

    /// URL used by [`ModelSource::Remote`].
    pub remote_url: Option<String>,

    /// Timeout for the whole model download.
    pub download_timeout: Duration,

    /// Directory downloaded models are cached in. None for the platform cache dir.
    pub cache_dir: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            sources: vec![ModelSource::Local, ModelSource::Remote],
            local_paths: default_local_paths(),
            remote_url: None,
            download_timeout: Duration::from_secs(60),
            cache_dir: None,
        }
    }
}

impl LoaderConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::InvalidParameter {
                name: "sources".to_string(),
                reason: "at least one model source is required".to_string(),
            });
        }

        if self.download_timeout.is_zero() {
            return Err(Error::InvalidParameter {
                name: "download_timeout".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Candidate model locations relative to the working directory and the
/// executable.
#[must_use]
pub fn default_local_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = ["", ".", ".."]
        .iter()
        .map(|dir| Path::new(dir).join(MODEL_FILENAME))
        .collect();

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        paths.push(exe_dir.join("..").join(MODEL_FILENAME));
    }

    paths
}

/// Resolves a classifier artifact from the configured sources and loads it.
#[derive(Debug, Clone)]
pub struct ModelLoader {
    config: LoaderConfig,
}

impl ModelLoader {
    /// Create a new loader.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Walk the configured sources and return the path of a model file,
    /// downloading it if a remote source is reached.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote source is misconfigured or the
    /// download fails, or if no source produced a model.
    pub fn resolve(&self) -> Result<PathBuf> {
        for source in &self.config.sources {
            match source {
                ModelSource::Local => {
                    if let Some(path) = self.find_local() {
                        tracing::info!("Found local model at {}", path.display());
                        return Ok(path);
                    }
                    tracing::debug!("No local model in {:?}", self.config.local_paths);
                }
                ModelSource::Remote => return self.fetch_remote(),
            }
        }

        Err(Error::ModelNotFound {
            searched: self
                .config
                .local_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    fn find_local(&self) -> Option<PathBuf> {
        self.config
            .local_paths
            .iter()
            .find(|path| path.is_file())
            .cloned()
    }

    fn remote_url(&self) -> Result<&str> {
        match self.config.remote_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() && url != PLACEHOLDER_MODEL_URL => Ok(url),
            _ => Err(Error::Configuration {
                reason: "MODEL_URL environment variable not set, please configure your model URL"
                    .to_string(),
            }),
        }
    }

    fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = self.config.cache_dir.clone().unwrap_or_else(|| {
            let base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
            base.join("pneumonia-detect").join("models")
        });

        fs::create_dir_all(&cache_dir).map_err(|source| Error::CacheDir {
            path: cache_dir.clone(),
            source,
        })?;

        Ok(cache_dir)
    }

    fn fetch_remote(&self) -> Result<PathBuf> {
        let url = self.remote_url()?;
        let path = self.cache_dir()?.join(cache_file_name(url));

        if path.is_file() {
            tracing::info!("Using cached model {}", path.display());
            return Ok(path);
        }

        download_file(url, &path, self.config.download_timeout)?;
        Ok(path)
    }
}

impl LoadClassifier for ModelLoader {
    fn load(&self) -> Result<Arc<dyn Classifier>> {
        let path = self.resolve()?;

        tracing::info!("Loading model from {}", path.display());
        let classifier = OnnxClassifier::from_file(&path)?;
        tracing::info!("Model loaded successfully");

        Ok(Arc::new(classifier))
    }
}

/// Cache file name for a URL: a hash of the full URL plus its last path
/// segment, so different URLs never share a cache entry.
pub(crate) fn cache_file_name(url: &str) -> String {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);

    let segment = url
        .split(['?', '#'])
        .next()
        .and_then(|u| u.rsplit('/').next())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.chars()
                .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
                .collect::<String>()
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| MODEL_FILENAME.to_string());

    format!("{:016x}-{segment}", hasher.finish())
}

/// Download a file from a URL to a path with progress indication.
fn download_file(url: &str, path: &Path, timeout: Duration) -> Result<()> {
    tracing::info!("Downloading model from {url}");

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| Error::ModelDownload {
            url: url.to_string(),
            source,
        })?;

    let response = client.get(url).send().map_err(|source| Error::ModelDownload {
        url: url.to_string(),
        source,
    })?;

    if !response.status().is_success() {
        return Err(Error::DownloadStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    // Write to a temporary file first, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    let written = write_body(response, &temp_path);
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    fs::rename(&temp_path, path)?;
    tracing::info!("Model downloaded to {}", path.display());

    Ok(())
}

fn write_body(mut response: reqwest::blocking::Response, temp_path: &Path) -> Result<()> {
    let pb = response
        .content_length()
        .map_or_else(ProgressBar::new_spinner, ProgressBar::new);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let mut file = fs::File::create(temp_path)?;
    let mut downloaded = 0u64;
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = std::io::Read::read(&mut response, &mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;
        pb.set_position(downloaded);
    }
    file.flush()?;

    pb.finish_and_clear();
    Ok(())
}
