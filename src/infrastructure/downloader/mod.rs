//! Comic downloader backed by the external `jmcomic` command-line program
//!
//! The crawler itself (domain discovery, retries, image descrambling) lives in
//! `jmcomic`. This adapter only translates our configuration into its option
//! file and supervises the child process.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::application::errors::DownloadError;
use crate::domain::traits::ComicDownloader;
use crate::infrastructure::config::DownloaderOptions;

/// File written next to the downloaded images
pub const OPTION_FILE_NAME: &str = ".jmcomic-option.yml";

/// Library default request timeout, not written to the option file
const LIBRARY_DEFAULT_TIMEOUT: u64 = 60;

/// Keep this much of stderr in error messages
const STDERR_TAIL: usize = 500;

/// Runs `jmcomic <id> --option <file>` for each download
pub struct JmcomicCli {
    binary_path: PathBuf,
    options: DownloaderOptions,
}

impl JmcomicCli {
    pub fn new(binary_path: PathBuf, options: DownloaderOptions) -> Self {
        Self { binary_path, options }
    }

    /// Use the configured binary, or find `jmcomic` on PATH
    pub fn from_options(options: DownloaderOptions) -> Result<Self, DownloadError> {
        let binary_path = match &options.binary {
            Some(path) => path.clone(),
            None => which::which("jmcomic")
                .map_err(|e| DownloadError::BinaryNotFound(format!("jmcomic: {}", e)))?,
        };
        Ok(Self::new(binary_path, options))
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    async fn write_option_file(&self, target_dir: &Path) -> Result<PathBuf, DownloadError> {
        let option = JmOption::build(&self.options, target_dir);
        let yaml = serde_yaml::to_string(&option).map_err(|e| DownloadError::Options(e.to_string()))?;
        let path = target_dir.join(OPTION_FILE_NAME);
        tokio::fs::write(&path, yaml)
            .await
            .map_err(|e| DownloadError::Options(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }
}

#[async_trait]
impl ComicDownloader for JmcomicCli {
    async fn download(&self, comic_id: &str, target_dir: &Path) -> Result<(), DownloadError> {
        let option_path = self.write_option_file(target_dir).await?;

        tracing::debug!(
            comic_id,
            client = %self.options.client_impl,
            images = self.options.concurrent_images,
            photos = self.options.concurrent_photos,
            dir = %target_dir.display(),
            "starting jmcomic"
        );

        // Dropping the future (deadline expiry) must stop the crawler too.
        let output = Command::new(&self.binary_path)
            .arg(comic_id)
            .arg("--option")
            .arg(&option_path)
            .current_dir(target_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(DownloadError::Spawn)?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .chars()
                .rev()
                .take(STDERR_TAIL)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            Err(DownloadError::Exit {
                status: output.status.to_string(),
                stderr: tail.trim().to_string(),
            })
        }
    }

    fn name(&self) -> &'static str {
        "jmcomic-cli"
    }
}

/// Option document understood by `jmcomic`
#[derive(Debug, Serialize, PartialEq)]
pub struct JmOption {
    log: bool,
    dir_rule: DirRule,
    client: ClientOption,
    download: DownloadOption,
}

#[derive(Debug, Serialize, PartialEq)]
struct DirRule {
    base_dir: PathBuf,
    rule: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    normalize_zh: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
struct ClientOption {
    #[serde(rename = "impl")]
    implementation: String,
    retry_times: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    postman: Option<Postman>,
}

#[derive(Debug, Serialize, PartialEq, Default)]
struct Postman {
    meta_data: MetaData,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
}

#[derive(Debug, Serialize, PartialEq, Default)]
struct MetaData {
    #[serde(skip_serializing_if = "Option::is_none")]
    proxies: Option<Proxies>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cookies: Option<BTreeMap<String, String>>,
}

/// Either a proxy keyword jmcomic resolves itself, or an explicit address
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
enum Proxies {
    Keyword(String),
    Explicit { http: String, https: String },
}

#[derive(Debug, Serialize, PartialEq)]
struct DownloadOption {
    cache: bool,
    image: ImageOption,
    threading: Threading,
}

#[derive(Debug, Serialize, PartialEq)]
struct ImageOption {
    decode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    suffix: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
struct Threading {
    image: u32,
    photo: u32,
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl JmOption {
    pub fn build(options: &DownloaderOptions, base_dir: &Path) -> Self {
        let proxies = non_empty(&options.proxy).map(|proxy| {
            let lower = proxy.to_lowercase();
            if matches!(lower.as_str(), "system" | "clash" | "v2ray") {
                Proxies::Keyword(lower)
            } else {
                Proxies::Explicit {
                    http: proxy.clone(),
                    https: proxy,
                }
            }
        });
        let cookies = non_empty(&options.cookies_avs)
            .map(|avs| BTreeMap::from([("AVS".to_string(), avs)]));
        let timeout = (options.timeout != 0 && options.timeout != LIBRARY_DEFAULT_TIMEOUT)
            .then_some(options.timeout);

        let postman = if proxies.is_some() || cookies.is_some() || timeout.is_some() {
            Some(Postman {
                meta_data: MetaData { proxies, cookies },
                timeout,
            })
        } else {
            None
        };

        Self {
            log: options.enable_log,
            dir_rule: DirRule {
                base_dir: base_dir.to_path_buf(),
                rule: options.dir_rule.clone(),
                normalize_zh: non_empty(&options.normalize_zh),
            },
            client: ClientOption {
                implementation: options.client_impl.clone(),
                retry_times: options.retry_times,
                postman,
            },
            download: DownloadOption {
                cache: options.download_cache,
                image: ImageOption {
                    decode: options.image_decode,
                    suffix: non_empty(&options.image_suffix),
                },
                threading: Threading {
                    image: options.concurrent_images,
                    photo: options.concurrent_photos,
                },
            },
        }
    }
}
