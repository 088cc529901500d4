//! CRD source classification
//!
//! A source locator is a repository browse URL, a downloadable archive or a
//! single raw file. Repository URLs are recognised from the URL alone; the
//! other two are told apart by sniffing the start of the response body.

use std::fmt;
use std::pin::pin;

use tracing::debug;
use url::Url;

use crate::archive::{self, Identification};
use crate::error::{Result, SourceError};
use crate::http::{self, HttpClient, SNIFF_LIMIT};

/// Host recognised as a code-hosting service by default
pub const DEFAULT_GIT_HOST: &str = "github.com";

/// Path segments marking a direct file or release link rather than a tree
const NON_TREE_MARKERS: &[&str] = &["blob", "releases"];

/// A repository subtree decomposed from a browse URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitTree {
    pub owner: String,
    pub repo: String,
    /// `https://<host>/<owner>/<repo>.git`
    pub clone_url: String,
    pub branch: String,
    /// Path inside the repository, empty for the repository root
    pub subdir: String,
}

/// What a CRD source locator names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Repository(GitTree),
    Archive,
    RawFile,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Repository(_) => "repository",
            SourceKind::Archive => "archive",
            SourceKind::RawFile => "raw file",
        }
    }
}

/// A classified CRD source, consumed once by the materializer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSource {
    pub locator: String,
    pub kind: SourceKind,
}

impl fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.locator, self.kind.name())
    }
}

fn parse_url(locator: &str) -> Result<Url> {
    let url = Url::parse(locator).map_err(|e| SourceError::InvalidUrl {
        url: locator.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SourceError::InvalidUrl {
            url: locator.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Classifies CRD source locators
#[derive(Debug, Clone)]
pub struct SourceClassifier {
    git_hosts: Vec<String>,
    client: HttpClient,
}

impl SourceClassifier {
    pub fn new(client: HttpClient) -> Self {
        Self {
            git_hosts: vec![DEFAULT_GIT_HOST.to_string()],
            client,
        }
    }

    /// Replace the set of hosts treated as code-hosting services
    pub fn with_git_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.git_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the locator is a repository browse URL. Never touches the network.
    pub fn is_repository_url(&self, locator: &str) -> Result<bool> {
        let url = parse_url(locator)?;
        Ok(self.is_repository(&url))
    }

    fn is_repository(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if !self.git_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
            return false;
        }

        let segments = path_segments(url);
        if segments.len() < 2 {
            return false;
        }
        !segments
            .get(2)
            .is_some_and(|marker| NON_TREE_MARKERS.contains(marker))
    }

    /// Decompose a repository browse URL into clone URL, branch and subdirectory
    pub fn parse_repository_url(&self, locator: &str) -> Result<GitTree> {
        let url = parse_url(locator)?;
        parse_tree(&url, locator)
    }

    /// Determine the kind of a CRD source.
    ///
    /// Repository detection comes first and needs no network access.
    /// Otherwise the body is fetched and its first bytes sniffed; the
    /// remainder is drained when the source turns out to be a raw file.
    pub async fn classify(&self, locator: &str) -> Result<SchemaSource> {
        let url = parse_url(locator)?;

        if self.is_repository(&url) {
            let tree = parse_tree(&url, locator)?;
            debug!(
                source = locator,
                branch = %tree.branch,
                subdir = %tree.subdir,
                "classified as repository"
            );
            return Ok(SchemaSource {
                locator: locator.to_string(),
                kind: SourceKind::Repository(tree),
            });
        }

        let response = self.client.get(url.as_str()).await?;
        let mut body = pin!(response.bytes_stream());
        let prefix = http::read_prefix(&mut body, SNIFF_LIMIT).await?;

        let identified = archive::identify(&prefix.bytes, prefix.complete).map_err(|e| {
            SourceError::Identification {
                url: locator.to_string(),
                message: e.to_string(),
            }
        })?;

        let kind = match identified {
            Identification::Archive(format) => {
                debug!(source = locator, %format, "classified as archive");
                SourceKind::Archive
            }
            Identification::Unsupported(format) => {
                return Err(SourceError::UnsupportedArchive {
                    url: locator.to_string(),
                    format: format.to_string(),
                });
            }
            Identification::NoMatch => {
                debug!(source = locator, "classified as raw file");
                SourceKind::RawFile
            }
        };

        if !prefix.complete {
            http::drain(&mut body).await?;
        }

        Ok(SchemaSource {
            locator: locator.to_string(),
            kind,
        })
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }
}

fn parse_tree(url: &Url, locator: &str) -> Result<GitTree> {
    let invalid = || SourceError::InvalidRepositoryUrl {
        url: locator.to_string(),
    };

    // owner, repo, "tree", branch, then an optional subdirectory
    let segments = path_segments(url);
    if segments.len() < 4 || segments[2] != "tree" {
        return Err(invalid());
    }
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(invalid());
    }

    let owner = segments[0].to_string();
    let repo = segments[1].trim_end_matches(".git").to_string();
    if repo.is_empty() {
        return Err(invalid());
    }
    let host = url.host_str().ok_or_else(invalid)?;

    Ok(GitTree {
        clone_url: format!("https://{}/{}/{}.git", host, owner, repo),
        owner,
        repo,
        branch: segments[3].to_string(),
        subdir: segments[4..].join("/"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::{gzip, tar_bytes, zip_bytes};
    use crate::error::ErrorKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn classifier() -> SourceClassifier {
        SourceClassifier::new(HttpClient::new().unwrap())
    }

    #[test]
    fn test_repository_detection() {
        let c = classifier();
        assert!(c
            .is_repository_url("https://github.com/org/repo/tree/main/config/crd")
            .unwrap());
        assert!(c.is_repository_url("https://github.com/org/repo").unwrap());
        assert!(!c
            .is_repository_url("https://github.com/org/repo/blob/main/crd.yaml")
            .unwrap());
        assert!(!c
            .is_repository_url("https://github.com/org/repo/releases/download/v1/crds.tgz")
            .unwrap());
        assert!(!c.is_repository_url("https://github.com/org").unwrap());
        assert!(!c
            .is_repository_url("https://example.com/org/repo/tree/main")
            .unwrap());
    }

    #[test]
    fn test_repository_detection_is_stable() {
        let c = classifier();
        let url = "https://github.com/org/repo/tree/main/config/crd";
        assert_eq!(
            c.is_repository_url(url).unwrap(),
            c.is_repository_url(url).unwrap()
        );
    }

    #[test]
    fn test_parse_repository_url() {
        let tree = classifier()
            .parse_repository_url("https://github.com/org/repo/tree/main/sub/dir/")
            .unwrap();
        assert_eq!(tree.owner, "org");
        assert_eq!(tree.repo, "repo");
        assert_eq!(tree.clone_url, "https://github.com/org/repo.git");
        assert_eq!(tree.branch, "main");
        assert_eq!(tree.subdir, "sub/dir");
    }

    #[test]
    fn test_parse_repository_root() {
        let tree = classifier()
            .parse_repository_url("https://github.com/org/repo/tree/main")
            .unwrap();
        assert_eq!(tree.clone_url, "https://github.com/org/repo.git");
        assert_eq!(tree.branch, "main");
        assert_eq!(tree.subdir, "");
    }

    #[test]
    fn test_parse_repository_url_too_short() {
        let err = classifier()
            .parse_repository_url("https://github.com/org/repo/tree")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(err.to_string().contains("invalid URL format"));

        assert!(classifier()
            .parse_repository_url("https://github.com/org/repo")
            .is_err());

        assert!(classifier()
            .parse_repository_url("https://github.com/org/repo/commits/main/x")
            .is_err());
        assert!(classifier()
            .parse_repository_url("https://github.com/org/repo/tree/main/../etc")
            .is_err());
    }

    #[test]
    fn test_malformed_url() {
        let err = classifier().is_repository_url("not a url").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);

        let err = classifier()
            .is_repository_url("ftp://github.com/org/repo")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[tokio::test]
    async fn test_classify_repository_needs_no_network() {
        let source = classifier()
            .classify("https://github.com/org/repo/tree/main/config/crd")
            .await
            .unwrap();
        match source.kind {
            SourceKind::Repository(tree) => {
                assert_eq!(tree.branch, "main");
                assert_eq!(tree.subdir, "config/crd");
                assert_eq!(tree.clone_url, "https://github.com/org/repo.git");
            }
            other => panic!("expected repository, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_classify_repository_too_short_is_format_error() {
        let err = classifier()
            .classify("https://github.com/org/repo/tree")
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidRepositoryUrl { .. }));
    }

    #[tokio::test]
    async fn test_classify_archive_and_raw() {
        let server = MockServer::start().await;
        let archive = gzip(&tar_bytes(&[("crds/widget.yaml", "kind: CustomResourceDefinition\n")]));
        Mock::given(method("GET"))
            .and(path("/crds.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/crd.yaml"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("kind: CustomResourceDefinition\n"),
            )
            .mount(&server)
            .await;

        let c = classifier();
        let archive = c
            .classify(&format!("{}/crds.tar.gz", server.uri()))
            .await
            .unwrap();
        assert_eq!(archive.kind, SourceKind::Archive);

        let raw = c.classify(&format!("{}/crd.yaml", server.uri())).await.unwrap();
        assert_eq!(raw.kind, SourceKind::RawFile);
    }

    #[tokio::test]
    async fn test_classify_zip_is_archive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crds.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[(
                "crds/widget.yaml",
                "kind: CustomResourceDefinition\n",
            )])))
            .mount(&server)
            .await;

        let source = classifier()
            .classify(&format!("{}/crds.zip", server.uri()))
            .await
            .unwrap();
        assert_eq!(source.kind, SourceKind::Archive);
    }

    #[tokio::test]
    async fn test_classify_large_raw_file_is_drained() {
        let server = MockServer::start().await;
        let body = "# padding\n".repeat(SNIFF_LIMIT / 4);
        Mock::given(method("GET"))
            .and(path("/big.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let source = classifier()
            .classify(&format!("{}/big.yaml", server.uri()))
            .await
            .unwrap();
        assert_eq!(source.kind, SourceKind::RawFile);
    }

    #[tokio::test]
    async fn test_classify_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/crds.rar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"Rar!\x1a\x07\x00rardata".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.yaml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let c = classifier();
        let err = c
            .classify(&format!("{}/crds.rar", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);

        let err = c
            .classify(&format!("{}/gone.yaml", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
