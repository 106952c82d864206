//! Cache version stamp.
//!
//! The stamp combines the user version, the crate version and a hash of the
//! files whose change should invalidate every cached transform.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::ContentHash;
use crate::error::CacheError;

/// Package manager lockfiles, in lookup order. Only the first found is used.
pub const LOCKFILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "bun.lockb",
    "npm-shrinkwrap.json",
];

const TSCONFIG: &str = "tsconfig.json";

/// Collect the files that feed the version hash.
///
/// Declared files are kept even if missing so [`cache_version`] can report
/// them; discovered files are only added when they exist.
pub async fn version_files(root: &Path, declared: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = declared.iter().map(|f| root.join(f)).collect();
    for name in LOCKFILES {
        let lockfile = root.join(name);
        if is_file(&lockfile).await {
            files.push(lockfile);
            break;
        }
    }
    let tsconfig = root.join(TSCONFIG);
    if is_file(&tsconfig).await {
        files.push(tsconfig);
    }
    files
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

/// Build `<user>(devgraph:<crate version>)-<hash>`.
pub async fn cache_version(user_version: &str, files: &[PathBuf]) -> Result<String, CacheError> {
    let mut contents = Vec::with_capacity(files.len());
    for file in files {
        match tokio::fs::read(file).await {
            Ok(content) => contents.push(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::VersionFileMissing(file.clone()));
            }
            Err(e) => return Err(CacheError::io(file, e)),
        }
    }
    let hash = ContentHash::of_parts(&contents);
    Ok(format!(
        "{}(devgraph:{})-{}",
        user_version,
        env!("CARGO_PKG_VERSION"),
        hash.short()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_version_files_discovery() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("yarn.lock"), "y").unwrap();
        fs::write(root.join("pnpm-lock.yaml"), "p").unwrap();
        fs::write(root.join("tsconfig.json"), "{}").unwrap();

        let files = version_files(root, &[PathBuf::from("extra.txt")]).await;
        assert_eq!(
            files,
            vec![
                root.join("extra.txt"),
                root.join("yarn.lock"),
                root.join("tsconfig.json"),
            ]
        );
    }

    #[tokio::test]
    async fn test_version_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("package-lock.json");
        fs::write(&lock, "1").unwrap();

        let v1 = cache_version("app", std::slice::from_ref(&lock)).await.unwrap();
        assert!(v1.starts_with(&format!("app(devgraph:{})-", env!("CARGO_PKG_VERSION"))));
        assert_eq!(v1, cache_version("app", std::slice::from_ref(&lock)).await.unwrap());

        fs::write(&lock, "2").unwrap();
        assert_ne!(v1, cache_version("app", &[lock]).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_version_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.json");
        assert!(matches!(
            cache_version("", &[missing.clone()]).await,
            Err(CacheError::VersionFileMissing(path)) if path == missing
        ));
    }
}
