//! Content-addressed bundle store
//!
//! Bundles live on disk as `<hash>.ddb`, where the name is the bundle hash
//! in lowercase hex. Two search paths are consulted: a read-only system
//! path shipped with the gateway and a writable user path; on a hash
//! collision the user path wins. Legacy `.ddf` files are renamed to `.ddb`
//! when first touched by a scan.

use std::fs;
use std::path::{Path, PathBuf};

use glob::glob;
use tracing::{debug, info, warn};

use crate::chunk::Bundle;
use crate::descriptor::BundleDescriptor;
use crate::error::{DdfError, Result};
use crate::hash::{bundle_hash, file_hash, BundleHash};

const BUNDLE_EXT: &str = "ddb";
const LEGACY_EXT: &str = "ddf";

/// One stored bundle as listed by enumeration.
#[derive(Debug, Clone)]
pub struct BundleEntry {
    /// Bundle hash (identity)
    pub hash: BundleHash,
    /// Hash of the file as stored
    pub file_hash: BundleHash,
    /// Parsed descriptor
    pub descriptor: BundleDescriptor,
    /// Path the bundle was read from
    pub path: PathBuf,
}

/// One page of an enumeration.
#[derive(Debug)]
pub struct BundlePage {
    pub entries: Vec<BundleEntry>,
    /// Total entries across all pages
    pub total: usize,
    /// Offset of the next page, `None` on the last page
    pub next_offset: Option<usize>,
}

/// The two-path bundle store.
#[derive(Debug, Clone)]
pub struct BundleStore {
    system_dir: PathBuf,
    user_dir: PathBuf,
}

impl BundleStore {
    /// Open a store; the user directory is created if absent.
    pub fn open(system_dir: impl Into<PathBuf>, user_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { system_dir: system_dir.into(), user_dir: user_dir.into() };
        fs::create_dir_all(&store.user_dir)?;
        Ok(store)
    }

    /// Validate and persist an uploaded bundle. Returns the bundle hash; a
    /// bundle with the same hash is replaced atomically. Nothing is written
    /// when validation fails.
    pub fn store(&self, data: &[u8]) -> Result<BundleHash> {
        let bundle = Bundle::parse(data)?;
        BundleDescriptor::parse(&bundle.descriptor_json)?;
        let hash = bundle_hash(&bundle);

        let final_path = self.user_path(&hash);
        let tmp_path = final_path.with_extension("ddb.tmp");
        fs::write(&tmp_path, data)?;
        fs::rename(&tmp_path, &final_path)?;
        info!("stored bundle {} ({} bytes)", hash, data.len());
        Ok(hash)
    }

    /// Raw bytes of a bundle, user path first.
    pub fn load(&self, hash: &BundleHash) -> Result<Vec<u8>> {
        for dir in [&self.user_dir, &self.system_dir] {
            let path = dir.join(format!("{hash}.{BUNDLE_EXT}"));
            if path.is_file() {
                return Ok(fs::read(path)?);
            }
            // Legacy extension: migrate in the writable path, read in place
            // in the read-only one.
            let legacy = dir.join(format!("{hash}.{LEGACY_EXT}"));
            if legacy.is_file() {
                if dir == &self.user_dir {
                    return Ok(fs::read(self.migrate(&legacy)?)?);
                }
                return Ok(fs::read(legacy)?);
            }
        }
        Err(DdfError::NotFound(hash.to_hex()))
    }

    /// Parsed descriptor of a stored bundle.
    pub fn descriptor(&self, hash: &BundleHash) -> Result<BundleDescriptor> {
        let data = self.load(hash)?;
        let bundle = Bundle::parse(&data)?;
        BundleDescriptor::parse(&bundle.descriptor_json)
    }

    pub fn contains(&self, hash: &BundleHash) -> bool {
        self.load(hash).is_ok()
    }

    /// Delete a bundle from the user path. System bundles cannot be removed.
    pub fn remove(&self, hash: &BundleHash) -> Result<()> {
        let path = self.user_path(hash);
        if !path.is_file() {
            return Err(DdfError::NotFound(hash.to_hex()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// Enumerate stored bundles, user path shadowing system, ordered by
    /// hash, one page at a time.
    pub fn list(&self, offset: usize, limit: usize) -> Result<BundlePage> {
        let mut entries: Vec<BundleEntry> = Vec::new();
        // System first so user entries replace them on conflict.
        for dir in [&self.system_dir, &self.user_dir] {
            let writable = dir == &self.user_dir;
            for entry in self.scan_dir(dir, writable)? {
                if let Some(existing) = entries.iter_mut().find(|e| e.hash == entry.hash) {
                    *existing = entry;
                } else {
                    entries.push(entry);
                }
            }
        }
        entries.sort_by_key(|e| e.hash.0);

        let total = entries.len();
        let page: Vec<BundleEntry> = entries.into_iter().skip(offset).take(limit).collect();
        let next_offset = if offset + page.len() < total {
            Some(offset + page.len())
        } else {
            None
        };
        Ok(BundlePage { entries: page, total, next_offset })
    }

    /// Scan one directory, migrating legacy extensions when writable.
    fn scan_dir(&self, dir: &Path, writable: bool) -> Result<Vec<BundleEntry>> {
        let mut out = Vec::new();
        if !dir.is_dir() {
            return Ok(out);
        }
        for ext in [BUNDLE_EXT, LEGACY_EXT] {
            let pattern = dir.join(format!("*.{ext}")).display().to_string();
            let paths = glob(&pattern).map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
            })?;
            for path in paths.flatten() {
                let path = if ext == LEGACY_EXT && writable {
                    self.migrate(&path)?
                } else {
                    path
                };
                match self.read_entry(&path) {
                    Ok(entry) => out.push(entry),
                    Err(e) => warn!("skipping unreadable bundle {}: {}", path.display(), e),
                }
            }
        }
        Ok(out)
    }

    fn read_entry(&self, path: &Path) -> Result<BundleEntry> {
        let data = fs::read(path)?;
        let bundle = Bundle::parse(&data)?;
        let descriptor = BundleDescriptor::parse(&bundle.descriptor_json)?;
        Ok(BundleEntry {
            hash: bundle_hash(&bundle),
            file_hash: file_hash(&data),
            descriptor,
            path: path.to_path_buf(),
        })
    }

    fn migrate(&self, legacy: &Path) -> Result<PathBuf> {
        let target = legacy.with_extension(BUNDLE_EXT);
        if target.is_file() {
            // Already migrated under a different name; the .ddb wins.
            fs::remove_file(legacy)?;
        } else {
            debug!("migrating {} -> {}", legacy.display(), target.display());
            fs::rename(legacy, &target)?;
        }
        Ok(target)
    }

    fn user_path(&self, hash: &BundleHash) -> PathBuf {
        self.user_dir.join(format!("{hash}.{BUNDLE_EXT}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bundle_for(model: &str) -> Vec<u8> {
        Bundle::encode(
            format!(
                r#"{{"manufacturername":"Acme","modelid":"{model}","schema":"devcap1.schema.json"}}"#
            )
            .as_bytes(),
            &[],
        )
    }

    fn store() -> (BundleStore, TempDir, TempDir) {
        let system = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        let store = BundleStore::open(system.path(), user.path()).unwrap();
        (store, system, user)
    }

    #[test]
    fn test_store_and_load_byte_identical() {
        let (store, _s, _u) = store();
        let data = bundle_for("bulb-1");
        let hash = store.store(&data).unwrap();
        assert_eq!(store.load(&hash).unwrap(), data);
    }

    #[test]
    fn test_invalid_bundle_writes_nothing() {
        let (store, _s, user) = store();
        let data = Bundle::encode(br#"{"modelid":"m","schema":"s"}"#, &[]);
        assert!(store.store(&data).is_err());
        assert_eq!(fs::read_dir(user.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_user_path_shadows_system() {
        let (store, system, _u) = store();
        let data = bundle_for("bulb-1");
        let bundle = Bundle::parse(&data).unwrap();
        let hash = bundle_hash(&bundle);
        fs::write(system.path().join(format!("{hash}.ddb")), &data).unwrap();

        // Same hash stored through the user path replaces the listing entry.
        store.store(&data).unwrap();
        let page = store.list(0, 10).unwrap();
        assert_eq!(page.total, 1);
        assert!(page.entries[0].path.starts_with(store.user_dir.as_path()));
    }

    #[test]
    fn test_legacy_extension_migrated() {
        let (store, _s, user) = store();
        let data = bundle_for("bulb-1");
        let bundle = Bundle::parse(&data).unwrap();
        let hash = bundle_hash(&bundle);
        fs::write(user.path().join(format!("{hash}.ddf")), &data).unwrap();

        assert_eq!(store.load(&hash).unwrap(), data);
        assert!(user.path().join(format!("{hash}.ddb")).is_file());
        assert!(!user.path().join(format!("{hash}.ddf")).exists());
    }

    #[test]
    fn test_pagination() {
        let (store, _s, _u) = store();
        for i in 0..5 {
            store.store(&bundle_for(&format!("bulb-{i}"))).unwrap();
        }
        let page1 = store.list(0, 2).unwrap();
        assert_eq!(page1.total, 5);
        assert_eq!(page1.entries.len(), 2);
        assert_eq!(page1.next_offset, Some(2));

        let page3 = store.list(4, 2).unwrap();
        assert_eq!(page3.entries.len(), 1);
        assert_eq!(page3.next_offset, None);
    }

    #[test]
    fn test_remove_user_only() {
        let (store, system, _u) = store();
        let data = bundle_for("sys");
        let bundle = Bundle::parse(&data).unwrap();
        let hash = bundle_hash(&bundle);
        fs::write(system.path().join(format!("{hash}.ddb")), &data).unwrap();

        assert!(store.remove(&hash).is_err());
        assert!(store.contains(&hash));
    }
}
