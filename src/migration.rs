use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    document,
    entities::{Entity, Gig, Invoice, Organization, Project, Task, TaskStatus, User},
    error::{Result, StoreError},
    paths::Family,
    store::{FamilyStore, StorageClient},
};

/// Converts the legacy single-file-per-family layout (`legacy/<family>.json`,
/// one JSON array per family) into the hierarchical partition layout.
///
/// `analyze` and `validate` are diagnosis tools: they collect findings into
/// reports and mutate nothing. `migrate` is re-runnable; already-migrated
/// entities are skipped by index presence, so a second run writes nothing.
/// Discrepancies are reported, never auto-corrected.
pub struct MigrationService<'a> {
    storage: &'a StorageClient,
    legacy_dir: PathBuf,
}

#[derive(Debug, Default, Serialize)]
pub struct FamilyAnalysis {
    pub only_legacy: Vec<String>,
    pub only_hierarchical: Vec<String>,
    pub divergent: Vec<String>,
    pub unparseable: Vec<String>,
}

impl FamilyAnalysis {
    pub fn is_clean(&self) -> bool {
        self.only_legacy.is_empty()
            && self.only_hierarchical.is_empty()
            && self.divergent.is_empty()
            && self.unparseable.is_empty()
    }
}

#[derive(Debug, Default, Serialize)]
pub struct MigrationReport {
    pub families: Vec<(Family, FamilyAnalysis)>,
}

impl MigrationReport {
    pub fn is_clean(&self) -> bool {
        self.families.iter().all(|(_, analysis)| analysis.is_clean())
    }
}

#[derive(Debug, Default, Serialize)]
pub struct MigrationOutcome {
    pub migrated: usize,
    pub skipped: usize,
    pub index_repaired: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    StaleIndexEntry,
    PathMismatch,
    MissingIndexEntry,
    InvalidDocument,
    StatusDrift,
}

#[derive(Debug, Serialize)]
pub struct ValidationIssue {
    pub family: Family,
    pub id: String,
    pub kind: IssueKind,
    pub detail: String,
}

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

impl<'a> MigrationService<'a> {
    pub fn new(storage: &'a StorageClient, legacy_dir: PathBuf) -> Self {
        Self {
            storage,
            legacy_dir,
        }
    }

    fn legacy_documents(&self, family: Family) -> Result<Vec<Value>> {
        let path = self.legacy_dir.join(format!("{family}.json"));
        Ok(document::read_json(&path)?.unwrap_or_default())
    }

    /// Reports entities present in one layout but not the other, or present
    /// in both with divergent fields. Mutates nothing.
    pub fn analyze(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        for family in Family::ALL {
            let analysis = match family {
                Family::Projects => self.analyze_family::<Project>()?,
                Family::Tasks => self.analyze_family::<Task>()?,
                Family::Invoices => self.analyze_family::<Invoice>()?,
                Family::Gigs => self.analyze_family::<Gig>()?,
                Family::Users => self.analyze_family::<User>()?,
                Family::Organizations => self.analyze_family::<Organization>()?,
            };
            report.families.push((family, analysis));
        }
        Ok(report)
    }

    fn analyze_family<T: FamilyStoreAccess>(&self) -> Result<FamilyAnalysis> {
        let mut analysis = FamilyAnalysis::default();
        let hierarchical = self.family_store::<T>().list_all()?;

        let mut seen_legacy = Vec::new();
        for raw in self.legacy_documents(T::FAMILY)? {
            let id = match raw.get("id").and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => {
                    analysis.unparseable.push(raw.to_string());
                    continue;
                }
            };
            let legacy: T = match serde_json::from_value(raw) {
                Ok(entity) => entity,
                Err(err) => {
                    analysis.unparseable.push(format!("{id}: {err}"));
                    continue;
                }
            };
            seen_legacy.push(id.clone());
            match hierarchical.iter().find(|entity| entity.id() == id) {
                None => analysis.only_legacy.push(id),
                Some(stored) => {
                    let legacy_value = serde_json::to_value(&legacy)?;
                    let stored_value = serde_json::to_value(stored)?;
                    if legacy_value != stored_value {
                        analysis.divergent.push(id);
                    }
                }
            }
        }

        for entity in &hierarchical {
            if !seen_legacy.iter().any(|id| id == entity.id()) {
                analysis.only_hierarchical.push(entity.id().to_string());
            }
        }
        Ok(analysis)
    }

    /// Moves every legacy entity that the index does not yet know about
    /// into the hierarchical layout. Index presence is the skip criterion,
    /// not a separate "migrated" flag, so two consecutive runs produce no
    /// duplicate writes.
    pub fn migrate(&self) -> Result<MigrationOutcome> {
        let mut outcome = MigrationOutcome::default();
        for family in Family::ALL {
            match family {
                Family::Projects => self.migrate_family::<Project>(&mut outcome)?,
                Family::Tasks => self.migrate_family::<Task>(&mut outcome)?,
                Family::Invoices => self.migrate_family::<Invoice>(&mut outcome)?,
                Family::Gigs => self.migrate_family::<Gig>(&mut outcome)?,
                Family::Users => self.migrate_family::<User>(&mut outcome)?,
                Family::Organizations => self.migrate_family::<Organization>(&mut outcome)?,
            }
        }
        info!(
            migrated = outcome.migrated,
            skipped = outcome.skipped,
            repaired = outcome.index_repaired,
            "migration pass finished"
        );
        Ok(outcome)
    }

    fn migrate_family<T: FamilyStoreAccess>(&self, outcome: &mut MigrationOutcome) -> Result<()> {
        let store = self.family_store::<T>();
        for raw in self.legacy_documents(T::FAMILY)? {
            let entity: T = match serde_json::from_value(raw.clone()) {
                Ok(entity) => entity,
                Err(err) => {
                    outcome
                        .errors
                        .push(format!("{}: unparseable legacy document: {err}", T::FAMILY));
                    continue;
                }
            };
            if let Err(err) = entity.validate() {
                outcome
                    .errors
                    .push(format!("{} {}: {err}", T::FAMILY, entity.id()));
                continue;
            }

            if store.index().lookup(entity.id())?.is_some() {
                outcome.skipped += 1;
                continue;
            }

            let path = T::FAMILY.resolve(
                self.storage.data_dir(),
                entity.id(),
                entity.created_at(),
            );
            let relative = T::FAMILY.resolve_relative(entity.id(), entity.created_at());
            if path.exists() {
                // Document landed earlier but the index lost it; heal the
                // index without touching the document.
                store
                    .index()
                    .upsert(entity.id(), relative, entity.created_at())?;
                outcome.index_repaired += 1;
                continue;
            }

            document::write_json(&path, &entity)?;
            store
                .index()
                .upsert(entity.id(), relative, entity.created_at())?;
            outcome.migrated += 1;
        }
        Ok(())
    }

    /// Structural consistency check over the hierarchical layout: index
    /// entries point at real files, derived paths agree with indexed paths,
    /// documents parse and satisfy their invariants, and project status
    /// matches task state. Findings are collected, never corrected.
    pub fn validate(&self) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();
        for family in Family::ALL {
            match family {
                Family::Projects => self.validate_family::<Project>(&mut report)?,
                Family::Tasks => self.validate_family::<Task>(&mut report)?,
                Family::Invoices => self.validate_family::<Invoice>(&mut report)?,
                Family::Gigs => self.validate_family::<Gig>(&mut report)?,
                Family::Users => self.validate_family::<User>(&mut report)?,
                Family::Organizations => self.validate_family::<Organization>(&mut report)?,
            }
        }
        self.validate_project_status(&mut report)?;
        if !report.is_clean() {
            warn!(issues = report.issues.len(), "validation found inconsistencies");
        }
        Ok(report)
    }

    fn validate_family<T: FamilyStoreAccess>(&self, report: &mut ValidationReport) -> Result<()> {
        let store = self.family_store::<T>();
        let index = store.index().load()?;
        let data_dir = self.storage.data_dir();

        for (id, entry) in &index {
            let path = data_dir.join(&entry.path);
            if !path.is_file() {
                report.issues.push(ValidationIssue {
                    family: T::FAMILY,
                    id: id.clone(),
                    kind: IssueKind::StaleIndexEntry,
                    detail: format!("index points at missing file {}", entry.path),
                });
                continue;
            }
            let derived = T::FAMILY.resolve_relative(id, entry.created_at);
            if derived != entry.path {
                report.issues.push(ValidationIssue {
                    family: T::FAMILY,
                    id: id.clone(),
                    kind: IssueKind::PathMismatch,
                    detail: format!("derived {derived}, indexed {}", entry.path),
                });
            }
        }

        let family_dir = T::FAMILY.dir(data_dir);
        for path in document::walk_documents(&family_dir, T::FAMILY.doc_name())? {
            let entity: T = match document::read_json(&path) {
                Ok(Some(entity)) => entity,
                Ok(None) => continue,
                Err(StoreError::CorruptDocument { path, reason }) => {
                    report.issues.push(ValidationIssue {
                        family: T::FAMILY,
                        id: path.display().to_string(),
                        kind: IssueKind::InvalidDocument,
                        detail: reason,
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };
            if let Err(err) = entity.validate() {
                report.issues.push(ValidationIssue {
                    family: T::FAMILY,
                    id: entity.id().to_string(),
                    kind: IssueKind::InvalidDocument,
                    detail: err.to_string(),
                });
            }
            if !index.contains_key(entity.id()) {
                report.issues.push(ValidationIssue {
                    family: T::FAMILY,
                    id: entity.id().to_string(),
                    kind: IssueKind::MissingIndexEntry,
                    detail: "document exists on disk but the index does not know it".into(),
                });
            }
        }
        Ok(())
    }

    fn validate_project_status(&self, report: &mut ValidationReport) -> Result<()> {
        let projects = self.storage.projects.list_all()?;
        let tasks = self.storage.tasks.list_all()?;
        for project in projects {
            let project_tasks: Vec<_> = tasks
                .iter()
                .filter(|task| task.project_id == project.id)
                .collect();
            if project_tasks.is_empty() {
                continue;
            }
            let all_approved = project_tasks
                .iter()
                .all(|task| task.status == TaskStatus::Approved);
            let marked_completed =
                project.status == crate::entities::ProjectStatus::Completed;
            if all_approved != marked_completed {
                report.issues.push(ValidationIssue {
                    family: Family::Projects,
                    id: project.id.clone(),
                    kind: IssueKind::StatusDrift,
                    detail: format!(
                        "project status {:?} disagrees with task state (all approved: {all_approved})",
                        project.status
                    ),
                });
            }
        }
        Ok(())
    }

    fn family_store<T: FamilyStoreAccess>(&self) -> &FamilyStore<T> {
        // Monomorphic access into the storage client.
        T::store_of(self.storage)
    }
}

/// Maps an entity type to its typed store on the client. Lives here rather
/// than on `Entity` itself to keep the entity definitions free of storage
/// concerns; migration is the only generic-over-family consumer.
pub trait FamilyStoreAccess: Entity {
    fn store_of(storage: &StorageClient) -> &FamilyStore<Self>;
}

impl FamilyStoreAccess for Project {
    fn store_of(storage: &StorageClient) -> &FamilyStore<Self> {
        &storage.projects
    }
}

impl FamilyStoreAccess for Task {
    fn store_of(storage: &StorageClient) -> &FamilyStore<Self> {
        &storage.tasks
    }
}

impl FamilyStoreAccess for Invoice {
    fn store_of(storage: &StorageClient) -> &FamilyStore<Self> {
        &storage.invoices
    }
}

impl FamilyStoreAccess for Gig {
    fn store_of(storage: &StorageClient) -> &FamilyStore<Self> {
        &storage.gigs
    }
}

impl FamilyStoreAccess for User {
    fn store_of(storage: &StorageClient) -> &FamilyStore<Self> {
        &storage.users
    }
}

impl FamilyStoreAccess for Organization {
    fn store_of(storage: &StorageClient) -> &FamilyStore<Self> {
        &storage.organizations
    }
}
