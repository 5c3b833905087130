use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::asset::{AssetId, AssetRecord};
use crate::error::RegistryError;

/// The hosting system's asset store: file records plus a per-asset key/value
/// metadata facility. The ledger and engine only ever reach state through here.
pub trait AssetRegistry {
    fn get_asset_record(&self, id: AssetId) -> Result<Option<AssetRecord>, RegistryError>;

    fn set_asset_record(
        &self,
        id: AssetId,
        file_path: &Path,
        mime_type: &str,
    ) -> Result<(), RegistryError>;

    /// All assets, optionally restricted to the given mime types.
    fn list_all_assets(
        &self,
        mime_filter: Option<&[&str]>,
    ) -> Result<Vec<AssetRecord>, RegistryError>;

    fn get_meta(&self, id: AssetId, key: &str) -> Result<Option<String>, RegistryError>;

    fn set_meta(&self, id: AssetId, key: &str, value: &str) -> Result<(), RegistryError>;

    fn delete_meta(&self, id: AssetId, key: &str) -> Result<(), RegistryError>;
}

impl<T: AssetRegistry + ?Sized> AssetRegistry for &T {
    fn get_asset_record(&self, id: AssetId) -> Result<Option<AssetRecord>, RegistryError> {
        (**self).get_asset_record(id)
    }

    fn set_asset_record(
        &self,
        id: AssetId,
        file_path: &Path,
        mime_type: &str,
    ) -> Result<(), RegistryError> {
        (**self).set_asset_record(id, file_path, mime_type)
    }

    fn list_all_assets(
        &self,
        mime_filter: Option<&[&str]>,
    ) -> Result<Vec<AssetRecord>, RegistryError> {
        (**self).list_all_assets(mime_filter)
    }

    fn get_meta(&self, id: AssetId, key: &str) -> Result<Option<String>, RegistryError> {
        (**self).get_meta(id, key)
    }

    fn set_meta(&self, id: AssetId, key: &str, value: &str) -> Result<(), RegistryError> {
        (**self).set_meta(id, key, value)
    }

    fn delete_meta(&self, id: AssetId, key: &str) -> Result<(), RegistryError> {
        (**self).delete_meta(id, key)
    }
}

/// Single-threaded registry kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    assets: RefCell<BTreeMap<AssetId, AssetRecord>>,
    meta: RefCell<BTreeMap<(AssetId, String), String>>,
    next_id: Cell<i64>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, file_path: impl Into<PathBuf>, mime_type: &str) -> AssetId {
        let id = AssetId(self.next_id.get() + 1);
        self.next_id.set(id.0);
        self.assets.borrow_mut().insert(
            id,
            AssetRecord {
                id,
                file_path: file_path.into(),
                mime_type: mime_type.to_string(),
            },
        );
        id
    }

    pub fn meta_keys(&self, id: AssetId) -> Vec<String> {
        self.meta
            .borrow()
            .keys()
            .filter(|(asset, _)| *asset == id)
            .map(|(_, key)| key.clone())
            .collect()
    }
}

impl AssetRegistry for MemoryRegistry {
    fn get_asset_record(&self, id: AssetId) -> Result<Option<AssetRecord>, RegistryError> {
        Ok(self.assets.borrow().get(&id).cloned())
    }

    fn set_asset_record(
        &self,
        id: AssetId,
        file_path: &Path,
        mime_type: &str,
    ) -> Result<(), RegistryError> {
        let mut assets = self.assets.borrow_mut();
        let record = assets
            .get_mut(&id)
            .ok_or_else(|| RegistryError::new(format!("asset {id} is not registered")))?;
        record.file_path = file_path.to_path_buf();
        record.mime_type = mime_type.to_string();
        Ok(())
    }

    fn list_all_assets(
        &self,
        mime_filter: Option<&[&str]>,
    ) -> Result<Vec<AssetRecord>, RegistryError> {
        Ok(self
            .assets
            .borrow()
            .values()
            .filter(|r| mime_filter.map_or(true, |mimes| mimes.contains(&r.mime_type.as_str())))
            .cloned()
            .collect())
    }

    fn get_meta(&self, id: AssetId, key: &str) -> Result<Option<String>, RegistryError> {
        Ok(self.meta.borrow().get(&(id, key.to_string())).cloned())
    }

    fn set_meta(&self, id: AssetId, key: &str, value: &str) -> Result<(), RegistryError> {
        self.meta
            .borrow_mut()
            .insert((id, key.to_string()), value.to_string());
        Ok(())
    }

    fn delete_meta(&self, id: AssetId, key: &str) -> Result<(), RegistryError> {
        self.meta.borrow_mut().remove(&(id, key.to_string()));
        Ok(())
    }
}
