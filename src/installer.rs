//! Installation of versioned relayer binaries.
//!
//! Binaries live under `<bin_dir>/<version>/icm-relayer`, with any `/` in the version
//! tag replaced by `-`. An executable already at
//! that path is reused as-is, so installing the same version twice downloads once.
use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::Command,
    sync::OnceLock,
};

use regex::Regex;
use reqwest::{blocking::Client, header};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    constants::{
        GITHUB_TOKEN_ENV, LATEST_PRERELEASE_TAG, LATEST_RELEASE_TAG, RELAYER_BIN_NAME,
        RELAYER_COMPONENT, RELEASE_ORG, RELEASE_REPO,
    },
    error::InstallError,
};

/// Release discovery and archive retrieval.
pub trait Downloader {
    /// Tag of the newest release (or pre-release) of the relayer component.
    fn latest_version(&self, prerelease: bool) -> Result<String, InstallError>;

    /// Fetches the body at `url`.
    fn download(&self, url: &str) -> Result<Vec<u8>, InstallError>;
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
}

/// [`Downloader`] backed by GitHub releases.
#[derive(Debug, Clone)]
pub struct GithubDownloader {
    client: Client,
    token: Option<String>,
    org: String,
    repo: String,
    component: String,
}

impl GithubDownloader {
    /// Downloader for the relayer's release repository; honours `GITHUB_TOKEN`.
    pub fn new() -> Result<Self, InstallError> {
        let client = Client::builder()
            .user_agent(concat!("relayerctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| InstallError::HttpError {
                url: "https://api.github.com".into(),
                source,
            })?;

        Ok(Self {
            client,
            token: std::env::var(GITHUB_TOKEN_ENV).ok().filter(|t| !t.is_empty()),
            org: RELEASE_ORG.into(),
            repo: RELEASE_REPO.into(),
            component: RELAYER_COMPONENT.into(),
        })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, InstallError> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().map_err(|source| InstallError::HttpError {
            url: url.to_string(),
            source,
        })?;
        if !response.status().is_success() {
            return Err(InstallError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

impl Downloader for GithubDownloader {
    fn latest_version(&self, prerelease: bool) -> Result<String, InstallError> {
        let url = format!(
            "https://api.github.com/repos/{}/{}/releases",
            self.org, self.repo
        );
        let releases: Vec<GithubRelease> =
            self.get(&url)?
                .json()
                .map_err(|source| InstallError::HttpError {
                    url: url.clone(),
                    source,
                })?;

        releases
            .into_iter()
            .filter(|release| !release.draft && release.prerelease == prerelease)
            .map(|release| release.tag_name)
            .find(|tag| is_component_release(tag, &self.component))
            .ok_or_else(|| InstallError::NoRelease {
                channel: if prerelease { "pre-release" } else { "release" },
                org: self.org.clone(),
                repo: self.repo.clone(),
                component: self.component.clone(),
            })
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, InstallError> {
        debug!("Downloading {url}");
        let bytes = self
            .get(url)?
            .bytes()
            .map_err(|source| InstallError::HttpError {
                url: url.to_string(),
                source,
            })?;
        Ok(bytes.to_vec())
    }
}

fn semver_regex() -> &'static Regex {
    static SEMVER: OnceLock<Regex> = OnceLock::new();
    SEMVER.get_or_init(|| {
        Regex::new(r"^v\d+\.\d+\.\d+(-[0-9A-Za-z.-]+)?$").expect("valid semver pattern")
    })
}

/// Whether `tag` is a relayer release tag with a semantic version.
pub fn is_component_release(tag: &str, component: &str) -> bool {
    tag.strip_prefix(component)
        .and_then(|rest| rest.strip_prefix('/').or_else(|| rest.strip_prefix('-')))
        .is_some_and(|version| semver_regex().is_match(version))
}

/// Maps the host to the `(os, arch)` pair used in release archive names.
pub fn platform() -> Result<(&'static str, &'static str), InstallError> {
    platform_for(std::env::consts::OS, std::env::consts::ARCH)
}

/// Maps Rust target names to release archive names.
pub fn platform_for(os: &str, arch: &str) -> Result<(&'static str, &'static str), InstallError> {
    let unsupported = || InstallError::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    };

    let os = match os {
        "linux" => "linux",
        "macos" => "darwin",
        _ => return Err(unsupported()),
    };
    let arch = match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        _ => return Err(unsupported()),
    };
    Ok((os, arch))
}

/// Download URL of the relayer archive for `version` on `os`/`arch`.
///
/// Relayer tags come in three layouts: `icm-relayer/vX.Y.Z`, `icm-relayer-vX.Y.Z` and
/// a bare `vX.Y.Z`.
pub fn release_url(version: &str, os: &str, arch: &str) -> String {
    let (tag_path, semantic) =
        if let Some(semantic) = version.strip_prefix(&format!("{RELAYER_COMPONENT}/")) {
            (format!("{RELAYER_COMPONENT}%2F{semantic}"), semantic)
        } else if let Some(semantic) =
            version.strip_prefix(&format!("{RELAYER_COMPONENT}-"))
        {
            (format!("{RELAYER_COMPONENT}-{semantic}"), semantic)
        } else {
            (version.to_string(), version)
        };

    format!(
        "https://github.com/{RELEASE_ORG}/{RELEASE_REPO}/releases/download/{tag_path}/{RELAYER_COMPONENT}_{}_{os}_{arch}.tar.gz",
        semantic.trim_start_matches('v'),
    )
}

/// Whether `path` is a regular file with an execute bit set.
pub fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Unpacks a gzip-compressed tarball into `dir` with the system `tar`.
pub fn extract_tar_gz(archive: &[u8], dir: &Path) -> Result<(), InstallError> {
    let extract_error = |reason: String| InstallError::ExtractError {
        dir: dir.to_path_buf(),
        reason,
    };

    fs::create_dir_all(dir)?;
    let archive_path = dir.join(format!("{RELAYER_COMPONENT}.tar.gz"));
    fs::write(&archive_path, archive)?;

    let output = Command::new("tar")
        .arg("-xzf")
        .arg(&archive_path)
        .arg("-C")
        .arg(dir)
        .output();
    let _ = fs::remove_file(&archive_path);

    let output = output.map_err(|err| extract_error(format!("failed to run tar: {err}")))?;
    if !output.status.success() {
        return Err(extract_error(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(())
}

/// Installs relayer binaries using a [`Downloader`].
#[derive(Debug, Clone)]
pub struct RelayerInstaller<D> {
    downloader: D,
}

impl<D: Downloader> RelayerInstaller<D> {
    /// Creates an installer around `downloader`.
    pub fn new(downloader: D) -> Self {
        Self { downloader }
    }

    /// The downloader in use.
    pub fn downloader(&self) -> &D {
        &self.downloader
    }

    /// Resolves `latest`/`latest-prerelease`/empty aliases to a concrete tag.
    pub fn resolve_version(&self, version: &str) -> Result<String, InstallError> {
        match version {
            "" | LATEST_RELEASE_TAG => self.downloader.latest_version(false),
            LATEST_PRERELEASE_TAG => self.downloader.latest_version(true),
            concrete => Ok(concrete.to_string()),
        }
    }

    /// Ensures `<bin_dir>/<version>/icm-relayer` exists and returns its path.
    pub fn install(&self, bin_dir: &Path, version: &str) -> Result<PathBuf, InstallError> {
        let version = self.resolve_version(version)?;
        info!("Relayer version {version}");

        let version_dir = bin_dir.join(version_dir_name(&version));
        let bin_path = version_dir.join(RELAYER_BIN_NAME);
        if is_executable(&bin_path) {
            debug!("Relayer {version} already installed at {}", bin_path.display());
            return Ok(bin_path);
        }

        let (os, arch) = platform()?;
        let url = release_url(&version, os, arch);
        info!("Installing relayer {version} from {url}");
        let archive = self.downloader.download(&url)?;
        extract_tar_gz(&archive, &version_dir)?;

        if !is_executable(&bin_path) {
            return Err(InstallError::MissingBinary(bin_path));
        }
        Ok(bin_path)
    }
}

/// Directory name for `version`; tags such as `icm-relayer/v1.4.0` are flattened.
pub fn version_dir_name(version: &str) -> String {
    version.replace('/', "-")
}

/// Versions under `bin_dir` holding an executable relayer, sorted by name.
pub fn installed_versions(bin_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(bin_dir) else {
        return Vec::new();
    };

    let mut versions: Vec<String> = entries
        .flatten()
        .filter(|entry| is_executable(&entry.path().join(RELAYER_BIN_NAME)))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    versions.sort();
    versions
}

/// Installs `version` into `bin_dir` from GitHub releases.
pub fn install_relayer(bin_dir: &Path, version: &str) -> Result<PathBuf, InstallError> {
    RelayerInstaller::new(GithubDownloader::new()?).install(bin_dir, version)
}
