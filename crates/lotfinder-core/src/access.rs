use crate::config::{AppConfig, ExtensionPolicy};
use crate::error::Error;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Which extension allow-list applies to a validation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessContext {
    Media,
    ScanImage,
    Document,
    /// Union of all three lists; used by the generic serve surface.
    Any,
}

/// A candidate path that passed every authorization check.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Canonicalizes and authorizes candidate paths against the allow-listed
/// roots, the per-context extension policy, and the size cap.
///
/// The containment decision is resolve-then-contain: the lexical check
/// runs first so out-of-tree candidates are rejected without touching the
/// filesystem, then the symlink-followed canonical path is checked again
/// against the canonicalized roots.
pub struct PathValidator {
    /// Roots as configured, for the pre-resolution lexical check.
    configured_roots: Vec<PathBuf>,
    /// Canonicalized roots, the authoritative containment boundary.
    resolved_roots: Vec<PathBuf>,
    policy: ExtensionPolicy,
    max_file_size: u64,
}

impl PathValidator {
    pub fn new(config: &AppConfig) -> Self {
        let configured_roots: Vec<PathBuf> = config
            .allowed_directories
            .iter()
            .filter(|d| d.enabled)
            .map(|d| PathBuf::from(&d.root_path))
            .collect();

        let resolved_roots = configured_roots
            .iter()
            .filter_map(|root| match fs::canonicalize(root) {
                Ok(resolved) => Some(resolved),
                Err(err) => {
                    debug!("Allowed root {} is not resolvable: {}", root.display(), err);
                    None
                }
            })
            .collect();

        PathValidator {
            configured_roots,
            resolved_roots,
            policy: config.extensions.clone(),
            max_file_size: config.max_file_size_bytes,
        }
    }

    /// Authorize `candidate` for `context`.
    ///
    /// Check order matters: traversal segments and containment are
    /// decided before anything on disk is probed, so rejected callers
    /// learn nothing about out-of-tree paths, including whether they
    /// exist.
    pub fn validate(&self, candidate: &str, context: AccessContext) -> Result<ResolvedPath, Error> {
        if candidate.trim().is_empty() {
            return Err(Error::InvalidPath);
        }

        let path = Path::new(candidate);
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            warn!("Security: parent-directory traversal rejected: {}", candidate);
            return Err(Error::PathTraversalAttempt);
        }

        if !path.is_absolute() {
            return Err(Error::InvalidPath);
        }

        if !self.lexically_contained(path) {
            warn!("Security: candidate outside allowed roots: {}", candidate);
            return Err(Error::AccessDenied);
        }

        if !self.extension_allowed(path, context) {
            warn!("Security: extension not allowed: {}", candidate);
            return Err(Error::AccessDenied);
        }

        // First filesystem touch. Follows symlinks, so the containment
        // re-check below closes the symlink-escape hole.
        let resolved = fs::canonicalize(path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound
            } else {
                Error::Io(err)
            }
        })?;

        if !self
            .resolved_roots
            .iter()
            .any(|root| resolved.starts_with(root))
        {
            warn!(
                "Security: resolved path escapes allowed roots: {} -> {}",
                candidate,
                resolved.display()
            );
            return Err(Error::AccessDenied);
        }

        let metadata = fs::metadata(&resolved)?;
        if !metadata.is_file() {
            return Err(Error::AccessDenied);
        }
        if metadata.len() > self.max_file_size {
            return Err(Error::TooLarge {
                size: metadata.len(),
                limit: self.max_file_size,
            });
        }

        Ok(ResolvedPath {
            path: resolved,
            size_bytes: metadata.len(),
        })
    }

    /// Validate, then open for reading. The serve surface goes through
    /// here so no handle exists before authorization succeeds.
    pub fn open(&self, candidate: &str) -> Result<(File, ResolvedPath), Error> {
        let resolved = self.validate(candidate, AccessContext::Any)?;
        let file = File::open(&resolved.path)?;
        Ok((file, resolved))
    }

    fn lexically_contained(&self, path: &Path) -> bool {
        self.configured_roots
            .iter()
            .chain(self.resolved_roots.iter())
            .any(|root| path.starts_with(root))
    }

    fn extension_allowed(&self, path: &Path, context: AccessContext) -> bool {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return false,
        };
        let listed = |list: &[String]| list.iter().any(|allowed| allowed == &ext);
        match context {
            AccessContext::Media => listed(&self.policy.media),
            AccessContext::ScanImage => listed(&self.policy.scan),
            AccessContext::Document => listed(&self.policy.document),
            AccessContext::Any => {
                listed(&self.policy.media)
                    || listed(&self.policy.scan)
                    || listed(&self.policy.document)
            }
        }
    }
}
