// Snapshot persistence for repositories
//
// Each repository serializes its whole map with bincode and replaces the
// file atomically (temp file then rename). Loading tolerates a missing
// file; a corrupt one is an error the caller surfaces at boot.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::PathBuf;

pub(crate) struct SnapshotStore<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> SnapshotStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub(crate) fn load(&self) -> Result<T> {
        if !self.path.exists() {
            return Ok(T::default());
        }
        let bytes = std::fs::read(&self.path)?;
        let (value, _) =
            bincode::serde::decode_from_slice::<T, _>(&bytes, bincode::config::standard())?;
        Ok(value)
    }

    pub(crate) fn save(&self, value: &T) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard())?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
