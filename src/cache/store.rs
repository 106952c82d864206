//! Content-addressed store of transform outputs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use super::manifest::{CONTENT_PREFIX, CacheEntry, MANIFEST_FILE, Manifest};
use super::sweep::{purge, sweep_stale};
use super::version::{cache_version, version_files};
use super::writer::ManifestWriter;
use crate::config::CacheConfig;
use crate::core::ContentHash;
use crate::error::CacheError;
use crate::graph::ModuleInfo;
use crate::plugin::SourceMap;
use crate::{debug, log, warn};

/// Code containing this marker depends on the file system layout, not just
/// on its own source, and is never persisted.
const GLOB_IMPORT: &str = "import.meta.glob";

/// Resolved options for [`PersistentCache::open`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub dir: PathBuf,
    pub version: String,
    pub version_files: Vec<PathBuf>,
    pub exclude: Vec<String>,
    pub flush_debounce: Duration,
}

impl CacheOptions {
    /// `None` when the cache is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config.enabled.then(|| Self {
            dir: config.dir.clone(),
            version: config.version.clone(),
            version_files: config.version_files.clone(),
            exclude: config.exclude.clone(),
            flush_debounce: Duration::from_millis(config.flush_debounce_ms),
        })
    }
}

/// A cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedModule {
    pub code: String,
    pub map: Option<SourceMap>,
    /// `None` for entries written without graph data.
    pub info: Option<ModuleInfo>,
}

/// Everything needed to persist one transform output.
#[derive(Debug)]
pub struct CacheRecord<'a> {
    pub id: &'a str,
    pub url: Option<&'a str>,
    pub file: &'a str,
    pub ssr: bool,
    pub code: &'a str,
    pub map: Option<&'a SourceMap>,
    pub info: Option<ModuleInfo>,
}

struct CacheInner {
    dir: PathBuf,
    version: String,
    exclude: Vec<String>,
    manifest: Arc<RwLock<Manifest>>,
    writer: ManifestWriter,
    /// Held shared while an entry is written, exclusively while sweeping,
    /// so a sweep never sees a content file before its manifest entry.
    content: tokio::sync::RwLock<()>,
}

/// Persistent transform cache rooted at one directory.
///
/// Read and write failures are logged and degrade to a miss.
#[derive(Clone)]
pub struct PersistentCache {
    inner: Arc<CacheInner>,
}

impl PersistentCache {
    /// Open (or create) the cache under `root`.
    ///
    /// A manifest stamped with another version empties the directory. An
    /// unreadable manifest is ignored. Content files no entry references are
    /// swept in the background.
    pub async fn open(root: &Path, options: CacheOptions) -> Result<Self, CacheError> {
        let dir = root.join(&options.dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;

        let files = version_files(root, &options.version_files).await;
        let version = cache_version(&options.version, &files).await?;

        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest = match Manifest::load(&manifest_path).await {
            Ok(Some(manifest)) if manifest.version == version => Some(manifest),
            Ok(Some(manifest)) => {
                debug!("cache"; "clearing cache ({} from {})", version, manifest.version);
                match purge(&dir).await {
                    Ok(n) => log!("cache"; "deleted {} files", n),
                    Err(e) => warn!("cache"; "failed to empty `{}`: {}", dir.display(), e),
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("cache"; "failed to load manifest `{}`: {}", manifest_path.display(), e);
                None
            }
        };
        let manifest = Arc::new(RwLock::new(
            manifest.unwrap_or_else(|| Manifest::new(version.clone())),
        ));

        let writer = ManifestWriter::new(manifest_path, Arc::clone(&manifest), options.flush_debounce);
        let cache = Self {
            inner: Arc::new(CacheInner {
                dir,
                version,
                exclude: options.exclude,
                manifest,
                writer,
                content: tokio::sync::RwLock::new(()),
            }),
        };

        let sweeper = cache.clone();
        tokio::spawn(async move {
            match sweeper.sweep().await {
                Ok(0) => {}
                Ok(n) => debug!("cache"; "swept {} stale files", n),
                Err(e) => warn!("cache"; "stale sweep failed: {}", e),
            }
        });

        Ok(cache)
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn len(&self) -> usize {
        self.inner.manifest.read().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.manifest.read().modules.contains_key(key)
    }

    /// Cache key of a module's loaded source.
    pub fn key(id: &str, code: &str, ssr: bool) -> String {
        let hash = ContentHash::of_parts([id, code]).to_hex();
        if ssr { format!("{hash}-ssr") } else { hash }
    }

    /// Whether a module must bypass the cache.
    pub fn is_excluded(&self, url: &str, code: &str) -> bool {
        code.contains(GLOB_IMPORT) || self.inner.exclude.iter().any(|pattern| url.contains(pattern.as_str()))
    }

    pub async fn read(&self, key: &str) -> Option<CachedModule> {
        let entry = self.inner.manifest.read().modules.get(key).cloned()?;
        match self.read_entry(&entry).await {
            Ok(module) => Some(module),
            Err(e) => {
                warn!("cache"; "failed to read entry `{}` ({}): {}", key, entry.file, e);
                None
            }
        }
    }

    async fn read_entry(&self, entry: &CacheEntry) -> Result<CachedModule, CacheError> {
        let code_path = self.inner.dir.join(&entry.file_code);
        let code = tokio::fs::read_to_string(&code_path)
            .await
            .map_err(|e| CacheError::io(&code_path, e))?;
        let map = match &entry.file_map {
            Some(name) => {
                let map_path = self.inner.dir.join(name);
                let raw = tokio::fs::read_to_string(&map_path)
                    .await
                    .map_err(|e| CacheError::io(&map_path, e))?;
                Some(serde_json::from_str(&raw)?)
            }
            None => None,
        };
        Ok(CachedModule {
            code,
            map,
            info: entry.module.clone(),
        })
    }

    /// Store a transform output and schedule a manifest write.
    pub async fn write(&self, key: &str, record: CacheRecord<'_>) {
        let file = record.file;
        if let Err(e) = self.write_entry(key, record).await {
            warn!("cache"; "failed to write entry `{}` ({}): {}", key, file, e);
        }
    }

    async fn write_entry(&self, key: &str, record: CacheRecord<'_>) -> Result<(), CacheError> {
        let _content = self.inner.content.read().await;
        let file_code = format!("{CONTENT_PREFIX}{key}");
        let code_path = self.inner.dir.join(&file_code);
        tokio::fs::write(&code_path, record.code)
            .await
            .map_err(|e| CacheError::io(&code_path, e))?;

        let file_map = match record.map {
            Some(map) => {
                let name = format!("{file_code}-map");
                let map_path = self.inner.dir.join(&name);
                tokio::fs::write(&map_path, serde_json::to_string(map)?)
                    .await
                    .map_err(|e| CacheError::io(&map_path, e))?;
                Some(name)
            }
            None => None,
        };

        let entry = CacheEntry {
            id: record.id.to_string(),
            url: record.url.map(str::to_string),
            file: record.file.to_string(),
            file_code,
            file_map,
            ssr: record.ssr,
            module: record.info,
        };
        self.inner.manifest.write().modules.insert(key.to_string(), entry);
        self.inner.writer.queue();
        Ok(())
    }

    /// Write the manifest now if a write is pending.
    pub async fn flush(&self) -> Result<(), CacheError> {
        self.inner.writer.flush().await
    }

    /// Remove content files no manifest entry references.
    pub async fn sweep(&self) -> Result<usize, CacheError> {
        let _content = self.inner.content.write().await;
        let referenced: FxHashSet<String> = self
            .inner
            .manifest
            .read()
            .referenced_files()
            .map(str::to_string)
            .collect();
        sweep_stale(&self.inner.dir, &referenced).await
    }

    #[cfg(test)]
    pub(crate) fn manifest_writes(&self) -> usize {
        self.inner.writer.writes()
    }
}

impl std::fmt::Debug for PersistentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCache")
            .field("dir", &self.inner.dir)
            .field("version", &self.inner.version)
            .field("entries", &self.len())
            .finish()
    }
}
