
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use git2::FetchOptions;
use git2::build::RepoBuilder;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{RepoChatError, Result};

/// Clones a remote repository into a fixed working directory, replacing
/// whatever copy was there before.
///
/// Not safe to use concurrently on the same path; index builds serialize
/// access through the build lock.
#[derive(Debug, Clone)]
pub struct RepositorySync {
    path: PathBuf,
    depth: u32,
}

impl RepositorySync {
    /// `depth` of 0 clones the full history
    #[inline]
    pub fn new(path: impl Into<PathBuf>, depth: u32) -> Self {
        Self {
            path: path.into(),
            depth,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn sync(&self, url: &str) -> Result<PathBuf> {
        let url = url.trim();
        if url.is_empty() {
            return Err(unavailable(url, "repository URL is empty"));
        }

        if self.path.exists() {
            debug!("Removing previous checkout at {}", self.path.display());
            remove_dir_forcefully(&self.path)?;
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!("Cloning {} into {}", url, self.path.display());

        let mut fetch_options = FetchOptions::new();
        // libgit2's local transport cannot do shallow fetches
        if self.depth > 0 && !is_local(url) {
            fetch_options.depth(i32::try_from(self.depth).unwrap_or(i32::MAX));
        }

        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options);

        let repository = match builder.clone(url, &self.path) {
            Ok(repository) => repository,
            Err(e) => {
                if self.path.exists() {
                    if let Err(cleanup) = remove_dir_forcefully(&self.path) {
                        warn!(
                            "Failed to clean up partial clone at {}: {}",
                            self.path.display(),
                            cleanup
                        );
                    }
                }
                return Err(unavailable(url, e.message()));
            }
        };

        match repository.head().and_then(|head| head.peel_to_commit()) {
            Ok(commit) => info!("Checked out {} at {}", url, commit.id()),
            Err(e) => debug!("Cloned {} without a resolvable HEAD: {}", url, e.message()),
        }

        Ok(self.path.clone())
    }
}

fn unavailable(url: &str, message: &str) -> RepoChatError {
    RepoChatError::RepositoryUnavailable {
        url: url.to_string(),
        message: message.to_string(),
    }
}

fn is_local(url: &str) -> bool {
    url.starts_with("file://") || (!url.contains("://") && !url.contains('@'))
}

/// Remove a directory tree, clearing read-only flags if the first attempt is
/// refused. Git object files are read-only on some platforms.
#[inline]
pub fn remove_dir_forcefully(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            debug!("Clearing read-only flags under {}", path.display());
            make_writable(path)?;
            fs::remove_dir_all(path)
        }
        Err(e) => Err(e),
    }
}

fn make_writable(path: &Path) -> io::Result<()> {
    for entry in WalkDir::new(path).into_iter().filter_map(|entry| entry.ok()) {
        let metadata = entry.metadata().map_err(io::Error::other)?;
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            #[expect(
                clippy::permissions_set_readonly_false,
                reason = "the tree is about to be deleted"
            )]
            permissions.set_readonly(false);
            fs::set_permissions(entry.path(), permissions)?;
        }
    }
    Ok(())
}
