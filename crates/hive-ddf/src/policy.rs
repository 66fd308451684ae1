//! Bundle selection per device policy

use tracing::debug;

use crate::descriptor::BundleStatus;
use crate::error::Result;
use crate::hash::BundleHash;
use crate::store::{BundleEntry, BundleStore};

/// Re-export of the per-device policy item value.
pub use hive_core::DdfPolicy;

/// Outcome of bundle selection for one device.
#[derive(Debug)]
pub enum Selection {
    /// A bundle applies
    Bundle(Box<BundleEntry>),
    /// The device descriptor comes from a free-form JSON file
    RawJson,
    /// No description: parsing falls back to built-in cluster handlers
    NoDescription,
}

/// Pick the bundle for a device given its policy, pinned hash, and identity
/// attributes.
pub fn select_bundle(
    store: &BundleStore,
    policy: DdfPolicy,
    pinned_hash: &str,
    manufacturer: &str,
    model: &str,
) -> Result<Selection> {
    match policy {
        DdfPolicy::RawJson => Ok(Selection::RawJson),
        DdfPolicy::Pin => {
            let Ok(hash) = BundleHash::from_hex(pinned_hash) else {
                return Ok(Selection::NoDescription);
            };
            match find_by_hash(store, &hash)? {
                Some(entry) => Ok(Selection::Bundle(Box::new(entry))),
                None => {
                    debug!("pinned bundle {} not in store", hash);
                    Ok(Selection::NoDescription)
                }
            }
        }
        DdfPolicy::Latest => Ok(pick(matches(store, manufacturer, model)?, false)),
        DdfPolicy::LatestPreferStable => Ok(pick(matches(store, manufacturer, model)?, true)),
    }
}

fn find_by_hash(store: &BundleStore, hash: &BundleHash) -> Result<Option<BundleEntry>> {
    let page = store.list(0, usize::MAX)?;
    Ok(page.entries.into_iter().find(|e| &e.hash == hash))
}

fn matches(store: &BundleStore, manufacturer: &str, model: &str) -> Result<Vec<BundleEntry>> {
    let page = store.list(0, usize::MAX)?;
    Ok(page
        .entries
        .into_iter()
        .filter(|e| e.descriptor.matches(manufacturer, model))
        .collect())
}

/// Highest version wins; with `prefer_stable`, any stable candidate beats
/// every non-stable one.
fn pick(candidates: Vec<BundleEntry>, prefer_stable: bool) -> Selection {
    let best = candidates.into_iter().max_by_key(|e| {
        let stable = prefer_stable && e.descriptor.status == BundleStatus::Stable;
        (stable, e.descriptor.version_key())
    });
    match best {
        Some(entry) => Selection::Bundle(Box::new(entry)),
        None => Selection::NoDescription,
    }
}
