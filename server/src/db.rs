use {
    anyhow::{Context, Result, anyhow, bail},
    casecrypt_protocol::{
        Record, Resource,
        record::{ID, is_encrypted, owner, record_id},
    },
    casecrypt_sdk::ResourceApi,
    sled::IVec,
    std::path::Path,
};

/// Record store with one sled tree per resource, keyed by record id.
/// Values are the JSON encoding of the record.
#[derive(Debug, Clone)]
pub struct Db {
    db: sled::Db,
}

/// A record as read by a scan, together with the exact bytes it was read
/// from.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: String,
    pub bytes: IVec,
    pub record: Record,
}

fn decode(bytes: &[u8]) -> Result<Record> {
    serde_json::from_slice(bytes).context("stored value is not a JSON object")
}

impl Db {
    #[inline]
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { db })
    }

    /// In-memory database removed on drop.
    #[inline]
    pub fn temporary() -> Result<Self> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    fn tree(&self, resource: Resource) -> Result<sled::Tree> {
        Ok(self.db.open_tree(resource.to_string())?)
    }

    #[inline]
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Writes a record as is, replacing any record with the same id.
    #[inline]
    pub fn put_raw(&self, resource: Resource, record: &Record) -> Result<()> {
        let id = record_id(record).ok_or_else(|| anyhow!("record has no id"))?;
        self.tree(resource)?
            .insert(id.as_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    #[inline]
    pub fn get_raw(&self, resource: Resource, id: &str) -> Result<Option<Record>> {
        self.tree(resource)?
            .get(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Every record of `resource`, in key order. Undecodable entries are
    /// reported as errors without stopping the scan.
    #[inline]
    pub fn scan(&self, resource: Resource) -> Result<impl Iterator<Item = Result<StoredRecord>>> {
        Ok(self.tree(resource)?.iter().map(|item| {
            let (key, bytes) = item?;
            let id = String::from_utf8(key.to_vec()).context("record id is not UTF-8")?;
            let record = decode(&bytes).with_context(|| format!("record {id}"))?;
            Ok(StoredRecord { id, bytes, record })
        }))
    }

    #[inline]
    pub fn scan_unencrypted(
        &self,
        resource: Resource,
    ) -> Result<impl Iterator<Item = Result<StoredRecord>>> {
        Ok(self
            .scan(resource)?
            .filter(|item| item.as_ref().map_or(true, |stored| !is_encrypted(&stored.record))))
    }

    #[inline]
    pub fn scan_encrypted(
        &self,
        resource: Resource,
    ) -> Result<impl Iterator<Item = Result<StoredRecord>>> {
        Ok(self
            .scan(resource)?
            .filter(|item| item.as_ref().map_or(true, |stored| is_encrypted(&stored.record))))
    }

    /// Replaces a scanned record only if it still has exactly the scanned
    /// bytes. Returns `false` if somebody else wrote or removed it meanwhile.
    #[inline]
    pub fn replace_if_unchanged(
        &self,
        resource: Resource,
        stored: &StoredRecord,
        record: &Record,
    ) -> Result<bool> {
        let new = serde_json::to_vec(record)?;
        let result = self.tree(resource)?.compare_and_swap(
            stored.id.as_bytes(),
            Some(&stored.bytes),
            Some(new),
        )?;
        Ok(result.is_ok())
    }
}

impl ResourceApi for Db {
    #[inline]
    fn create(&self, resource: Resource, mut record: Record) -> Result<Record> {
        let id = match record_id(&record) {
            Some(id) => id.to_owned(),
            None => {
                let id = self.db.generate_id()?.to_string();
                record.insert(ID.into(), id.clone().into());
                id
            }
        };
        let bytes = serde_json::to_vec(&record)?;
        let result =
            self.tree(resource)?
                .compare_and_swap(id.as_bytes(), None::<&[u8]>, Some(bytes))?;
        if result.is_err() {
            bail!("{resource} record {id} already exists");
        }
        Ok(record)
    }

    #[inline]
    fn get(&self, resource: Resource, id: &str) -> Result<Option<Record>> {
        self.get_raw(resource, id)
    }

    #[inline]
    fn get_many(&self, resource: Resource, user: &str) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for item in self.scan(resource)? {
            let stored = item?;
            if owner(&stored.record) == Some(user) {
                records.push(stored.record);
            }
        }
        Ok(records)
    }

    #[inline]
    fn update(&self, resource: Resource, id: &str, patch: Record) -> Result<Record> {
        let tree = self.tree(resource)?;
        loop {
            let Some(old) = tree.get(id.as_bytes())? else {
                bail!("{resource} record {id} does not exist");
            };
            let mut record = decode(&old)?;
            record.extend(patch.clone());
            record.insert(ID.into(), id.into());
            let new = serde_json::to_vec(&record)?;
            if tree
                .compare_and_swap(id.as_bytes(), Some(&old), Some(new))?
                .is_ok()
            {
                return Ok(record);
            }
        }
    }

    #[inline]
    fn delete(&self, resource: Resource, id: &str) -> Result<Option<Record>> {
        self.tree(resource)?
            .remove(id.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }
}
