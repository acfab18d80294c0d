use std::{marker::PhantomData, path::PathBuf};

use tracing::warn;

use crate::{
    config::Config,
    document,
    entities::{Entity, Gig, Invoice, Organization, Project, Task, User},
    error::{Result, StoreError},
    index::FamilyIndex,
    notifications::NotificationStore,
    wallet::WalletLedger,
};

/// CRUD-style storage for one entity family, built on the atomic file
/// primitive, the path resolver, and the per-family index.
///
/// `update` is read-modify-write on a single document; two concurrent
/// updates to the same id race at the rename and the last writer wins.
/// That is an accepted property of the store, which is why `update`
/// returns the post-write value: callers must not assume their patch won.
pub struct FamilyStore<T: Entity> {
    data_dir: PathBuf,
    index: FamilyIndex,
    _entity: PhantomData<T>,
}

impl<T: Entity> FamilyStore<T> {
    pub fn open(data_dir: PathBuf) -> Self {
        let index = FamilyIndex::open(data_dir.clone(), T::FAMILY);
        Self {
            data_dir,
            index,
            _entity: PhantomData,
        }
    }

    pub fn index(&self) -> &FamilyIndex {
        &self.index
    }

    pub fn create(&self, entity: &T) -> Result<()> {
        entity.validate()?;
        if self.read(entity.id())?.is_some() {
            return Err(StoreError::AlreadyExists(format!(
                "{} {}",
                T::FAMILY,
                entity.id()
            )));
        }
        let path = T::FAMILY.resolve(&self.data_dir, entity.id(), entity.created_at());
        document::write_json(&path, entity)?;
        self.index.upsert(
            entity.id(),
            T::FAMILY.resolve_relative(entity.id(), entity.created_at()),
            entity.created_at(),
        )
    }

    /// Index-first lookup with a directory-scan fallback, so a stale or
    /// missing index degrades to a slower read instead of a false miss.
    pub fn read(&self, id: &str) -> Result<Option<T>> {
        if let Some(entry) = self.index.lookup(id)? {
            let path = self.data_dir.join(&entry.path);
            if let Some(entity) = document::read_json::<T>(&path)? {
                return Ok(Some(entity));
            }
            warn!(family = %T::FAMILY, id, "index entry points at a missing document, falling back to scan");
        }
        for entity in self.list_all()? {
            if entity.id() == id {
                return Ok(Some(entity));
            }
        }
        Ok(None)
    }

    /// Read-modify-write of a single document. The mutation must not change
    /// the entity's identity or creation date; the partition path is derived
    /// from them. Returns the post-write value.
    pub fn update<F>(&self, id: &str, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut T) -> Result<()>,
    {
        let current = self
            .read(id)?
            .ok_or_else(|| StoreError::not_found(T::FAMILY.as_str(), id))?;
        let created_at = current.created_at();

        let mut next = current;
        mutate(&mut next)?;
        if next.id() != id || next.created_at() != created_at {
            return Err(StoreError::Validation(
                "updates must not change an entity's id or creation date".into(),
            ));
        }
        next.validate()?;

        let path = T::FAMILY.resolve(&self.data_dir, id, created_at);
        document::write_json(&path, &next)?;
        self.index
            .upsert(id, T::FAMILY.resolve_relative(id, created_at), created_at)?;
        Ok(next)
    }

    /// Soft delete. Financial families are never unlinked; the document
    /// stays on disk with its archived marker set.
    pub fn archive(&self, id: &str) -> Result<T> {
        self.update(id, |entity| {
            entity.set_archived(true);
            Ok(())
        })
    }

    /// Full directory walk producing every entity of the family. This is
    /// the canonical aggregate query primitive; callers filter in memory.
    pub fn list_all(&self) -> Result<Vec<T>> {
        let family_dir = T::FAMILY.dir(&self.data_dir);
        let mut entities = Vec::new();
        for path in document::walk_documents(&family_dir, T::FAMILY.doc_name())? {
            if let Some(entity) = document::read_json::<T>(&path)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }
}

/// Every service takes the storage client by reference; there are no
/// ambient singletons or cross-request caches. Each read goes to disk.
pub struct StorageClient {
    pub projects: FamilyStore<Project>,
    pub tasks: FamilyStore<Task>,
    pub invoices: FamilyStore<Invoice>,
    pub gigs: FamilyStore<Gig>,
    pub users: FamilyStore<User>,
    pub organizations: FamilyStore<Organization>,
    pub wallet: WalletLedger,
    pub notifications: NotificationStore,
    data_dir: PathBuf,
}

impl StorageClient {
    pub fn open(config: &Config) -> Result<Self> {
        config.ensure_data_dir()?;
        let data_dir = config.data_dir.clone();
        Ok(Self {
            projects: FamilyStore::open(data_dir.clone()),
            tasks: FamilyStore::open(data_dir.clone()),
            invoices: FamilyStore::open(data_dir.clone()),
            gigs: FamilyStore::open(data_dir.clone()),
            users: FamilyStore::open(data_dir.clone()),
            organizations: FamilyStore::open(data_dir.clone()),
            wallet: WalletLedger::open(&data_dir),
            notifications: NotificationStore::open(&data_dir),
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }
}
