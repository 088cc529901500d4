//! Release installation for the validator and Flux binaries
//!
//! Binaries are downloaded from their GitHub releases, checked against the
//! release checksum file and cached per tool and version.

use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::archive;
use crate::error::{Result, SourceError};
use crate::http::HttpClient;

const KUBECONFORM_RELEASES: &str = "https://github.com/yannh/kubeconform/releases/download";
const FLUX_RELEASES: &str = "https://github.com/fluxcd/flux2/releases/download";

/// Operating system and architecture names as used in release asset names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    /// Platform of the running binary
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    fn release_names(&self, tool: &str) -> Result<(&'static str, &'static str)> {
        let os = match self.os.as_str() {
            "linux" => "linux",
            "macos" | "darwin" => "darwin",
            _ => return Err(self.unsupported(tool)),
        };
        let arch = match self.arch.as_str() {
            "x86_64" | "amd64" => "amd64",
            "aarch64" | "arm64" => "arm64",
            _ => return Err(self.unsupported(tool)),
        };
        Ok((os, arch))
    }

    fn unsupported(&self, tool: &str) -> SourceError {
        SourceError::UnsupportedPlatform {
            tool: tool.to_string(),
            os: self.os.clone(),
            arch: self.arch.clone(),
        }
    }
}

/// Which released tool to install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Kubeconform,
    Flux,
}

impl Tool {
    pub fn binary(&self) -> &'static str {
        match self {
            Tool::Kubeconform => "kubeconform",
            Tool::Flux => "flux",
        }
    }
}

/// A concrete release asset of a tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRelease {
    pub tool: Tool,
    /// Version as it appears in the release tag
    pub version: String,
    pub archive_name: String,
    pub archive_url: String,
    pub checksums_url: String,
}

impl ToolRelease {
    /// Validator release; the tag always carries a `v` prefix
    pub fn kubeconform(version: &str, platform: &Platform) -> Result<Self> {
        Self::kubeconform_from(KUBECONFORM_RELEASES, version, platform)
    }

    /// Flux CLI release; asset names carry the version without `v`
    pub fn flux(version: &str, platform: &Platform) -> Result<Self> {
        Self::flux_from(FLUX_RELEASES, version, platform)
    }

    pub fn kubeconform_from(base: &str, version: &str, platform: &Platform) -> Result<Self> {
        let (os, arch) = platform.release_names(Tool::Kubeconform.binary())?;
        let tag = format!("v{}", version.trim_start_matches('v'));
        let archive_name = format!("kubeconform-{}-{}.tar.gz", os, arch);

        Ok(Self {
            tool: Tool::Kubeconform,
            archive_url: format!("{}/{}/{}", base, tag, archive_name),
            checksums_url: format!("{}/{}/CHECKSUMS", base, tag),
            version: tag,
            archive_name,
        })
    }

    pub fn flux_from(base: &str, version: &str, platform: &Platform) -> Result<Self> {
        let (os, arch) = platform.release_names(Tool::Flux.binary())?;
        let bare = version.trim_start_matches('v');
        let archive_name = format!("flux_{}_{}_{}.tar.gz", bare, os, arch);

        Ok(Self {
            tool: Tool::Flux,
            archive_url: format!("{}/v{}/{}", base, bare, archive_name),
            checksums_url: format!("{}/v{}/flux_{}_checksums.txt", base, bare, bare),
            version: bare.to_string(),
            archive_name,
        })
    }
}

/// Downloads and caches tool binaries
#[derive(Debug, Clone)]
pub struct ToolInstaller {
    cache_dir: PathBuf,
    client: HttpClient,
}

impl ToolInstaller {
    pub fn new(cache_dir: impl Into<PathBuf>, client: HttpClient) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            client,
        }
    }

    /// Installer caching under the user cache directory
    pub fn with_default_cache(client: HttpClient) -> Self {
        Self::new(default_cache_dir(), client)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path the binary of `release` is cached at
    pub fn binary_path(&self, release: &ToolRelease) -> PathBuf {
        self.cache_dir
            .join(release.tool.binary())
            .join(&release.version)
            .join(release.tool.binary())
    }

    /// Return the cached binary or download, verify and unpack it
    pub async fn install(&self, release: &ToolRelease) -> Result<PathBuf> {
        let target = self.binary_path(release);
        if tokio::fs::try_exists(&target).await? {
            debug!(tool = release.tool.binary(), path = %target.display(), "using cached binary");
            return Ok(target);
        }

        info!(
            tool = release.tool.binary(),
            version = %release.version,
            "downloading release"
        );

        let checksums = self.client.get_text(&release.checksums_url).await?;
        let expected = find_checksum(&checksums, &release.archive_name).ok_or_else(|| {
            SourceError::ChecksumMissing {
                file: release.archive_name.clone(),
                checksums: release.checksums_url.clone(),
            }
        })?;

        let data = self.client.get_bytes(&release.archive_url).await?;
        let actual = hex::encode(Sha256::digest(&data));
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(SourceError::ChecksumMismatch {
                file: release.archive_name.clone(),
                expected,
                actual,
            });
        }

        let binary = archive::read_entry(GzDecoder::new(&data[..]), release.tool.binary())
            .map_err(|e| SourceError::Extraction {
                url: release.archive_url.clone(),
                message: e.to_string(),
            })?
            .ok_or_else(|| SourceError::BinaryNotFound {
                binary: release.tool.binary().to_string(),
                archive: release.archive_name.clone(),
            })?;

        write_executable(&target, &binary).await?;
        Ok(target)
    }
}

/// `<user cache>/kubegate/tools`, or a relative fallback when no cache dir exists
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("kubegate")
        .join("tools")
}

/// Look up the digest for `file` in a `sha256sum`-style listing
fn find_checksum(listing: &str, file: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');
        (name == file).then(|| digest.to_string())
    })
}

async fn write_executable(target: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // never leave a partial download at the target path
    let partial = target.with_extension("partial");
    tokio::fs::write(&partial, content).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&partial, std::fs::Permissions::from_mode(0o755)).await?;
    }

    tokio::fs::rename(&partial, target).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::{gzip, tar_bytes};
    use crate::error::ErrorKind;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn linux_amd64() -> Platform {
        Platform {
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        }
    }

    #[test]
    fn test_release_urls() {
        let kc = ToolRelease::kubeconform("0.6.7", &linux_amd64()).unwrap();
        assert_eq!(
            kc.archive_url,
            "https://github.com/yannh/kubeconform/releases/download/v0.6.7/kubeconform-linux-amd64.tar.gz"
        );
        assert_eq!(
            kc.checksums_url,
            "https://github.com/yannh/kubeconform/releases/download/v0.6.7/CHECKSUMS"
        );

        let mac = Platform {
            os: "macos".to_string(),
            arch: "aarch64".to_string(),
        };
        let flux = ToolRelease::flux("v2.5.1", &mac).unwrap();
        assert_eq!(
            flux.archive_url,
            "https://github.com/fluxcd/flux2/releases/download/v2.5.1/flux_2.5.1_darwin_arm64.tar.gz"
        );
        assert_eq!(flux.version, "2.5.1");
    }

    #[test]
    fn test_unsupported_platform() {
        let platform = Platform {
            os: "windows".to_string(),
            arch: "x86_64".to_string(),
        };
        let err = ToolRelease::kubeconform("v0.6.7", &platform).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Toolchain);
    }

    #[test]
    fn test_find_checksum() {
        let listing = "aaaa  kubeconform-darwin-amd64.tar.gz\nbbbb *kubeconform-linux-amd64.tar.gz\n";
        assert_eq!(
            find_checksum(listing, "kubeconform-linux-amd64.tar.gz").as_deref(),
            Some("bbbb")
        );
        assert!(find_checksum(listing, "kubeconform-linux-arm64.tar.gz").is_none());
    }

    async fn serve_release(server: &MockServer, archive: Vec<u8>, digest: &str) {
        Mock::given(method("GET"))
            .and(path("/v0.6.7/kubeconform-linux-amd64.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v0.6.7/CHECKSUMS"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!("{}  kubeconform-linux-amd64.tar.gz\n", digest)),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_install_and_reuse_cache() {
        let server = MockServer::start().await;
        let archive = gzip(&tar_bytes(&[
            ("LICENSE", "license"),
            ("kubeconform", "#!/bin/sh\necho ok\n"),
        ]));
        let digest = hex::encode(Sha256::digest(&archive));
        serve_release(&server, archive, &digest).await;

        let temp = TempDir::new().unwrap();
        let installer = ToolInstaller::new(temp.path(), HttpClient::new().unwrap());
        let release =
            ToolRelease::kubeconform_from(&server.uri(), "v0.6.7", &linux_amd64()).unwrap();

        let installed = installer.install(&release).await.unwrap();
        assert_eq!(installed, temp.path().join("kubeconform/v0.6.7/kubeconform"));
        assert_eq!(
            std::fs::read_to_string(&installed).unwrap(),
            "#!/bin/sh\necho ok\n"
        );

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&installed).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        // second install must not hit the network again
        server.reset().await;
        let again = installer.install(&release).await.unwrap();
        assert_eq!(again, installed);
    }

    #[tokio::test]
    async fn test_install_rejects_checksum_mismatch() {
        let server = MockServer::start().await;
        let archive = gzip(&tar_bytes(&[("kubeconform", "binary")]));
        serve_release(&server, archive, &"0".repeat(64)).await;

        let temp = TempDir::new().unwrap();
        let installer = ToolInstaller::new(temp.path(), HttpClient::new().unwrap());
        let release =
            ToolRelease::kubeconform_from(&server.uri(), "0.6.7", &linux_amd64()).unwrap();

        let err = installer.install(&release).await.unwrap_err();
        assert!(matches!(err, SourceError::ChecksumMismatch { .. }));
        assert!(!installer.binary_path(&release).exists());
    }

    #[tokio::test]
    async fn test_install_missing_binary_in_archive() {
        let server = MockServer::start().await;
        let archive = gzip(&tar_bytes(&[("README.md", "nothing here")]));
        let digest = hex::encode(Sha256::digest(&archive));
        serve_release(&server, archive, &digest).await;

        let temp = TempDir::new().unwrap();
        let installer = ToolInstaller::new(temp.path(), HttpClient::new().unwrap());
        let release =
            ToolRelease::kubeconform_from(&server.uri(), "v0.6.7", &linux_amd64()).unwrap();

        let err = installer.install(&release).await.unwrap_err();
        assert!(matches!(err, SourceError::BinaryNotFound { .. }));
    }
}
