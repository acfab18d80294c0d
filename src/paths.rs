use std::{fmt, path::Path, path::PathBuf, str::FromStr};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// An entity family stored under its own partition tree.
///
/// This enum is the single source of truth for the partitioning scheme:
/// directory name, month-segment style, and document filename per family.
/// The Index Maintainer and Migration Service both derive paths from here,
/// so they can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Projects,
    Tasks,
    Invoices,
    Gigs,
    Users,
    Organizations,
}

impl Family {
    pub const ALL: [Family; 6] = [
        Family::Projects,
        Family::Tasks,
        Family::Invoices,
        Family::Gigs,
        Family::Users,
        Family::Organizations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Projects => "projects",
            Family::Tasks => "tasks",
            Family::Invoices => "invoices",
            Family::Gigs => "gigs",
            Family::Users => "users",
            Family::Organizations => "organizations",
        }
    }

    pub fn doc_name(&self) -> &'static str {
        match self {
            Family::Projects => "project.json",
            Family::Tasks => "task.json",
            Family::Invoices => "invoice.json",
            Family::Gigs => "gig.json",
            Family::Users => "user.json",
            Family::Organizations => "organization.json",
        }
    }

    /// Business families use English month names; account families use
    /// zero-padded month numbers. Fixed per family, never both.
    fn month_segment(&self, created_at: DateTime<Utc>) -> String {
        match self {
            Family::Projects | Family::Tasks | Family::Invoices | Family::Gigs => {
                MONTH_NAMES[created_at.month0() as usize].to_string()
            }
            Family::Users | Family::Organizations => format!("{:02}", created_at.month()),
        }
    }

    pub fn dir(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.as_str())
    }

    /// Pure partition-path derivation: stable under repeated calls, no
    /// current-time dependence. Re-deriving from an entity's stored
    /// creation date always reproduces the path used at creation time.
    pub fn resolve(&self, data_dir: &Path, id: &str, created_at: DateTime<Utc>) -> PathBuf {
        self.dir(data_dir)
            .join(format!("{:04}", created_at.year()))
            .join(self.month_segment(created_at))
            .join(format!("{:02}", created_at.day()))
            .join(id)
            .join(self.doc_name())
    }

    /// Same derivation, relative to the data directory. This is the form
    /// stored in index entries.
    pub fn resolve_relative(&self, id: &str, created_at: DateTime<Utc>) -> String {
        format!(
            "{}/{:04}/{}/{:02}/{}/{}",
            self.as_str(),
            created_at.year(),
            self.month_segment(created_at),
            created_at.day(),
            id,
            self.doc_name()
        )
    }

    pub fn index_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{}-index.json", self.as_str()))
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "projects" => Ok(Family::Projects),
            "tasks" => Ok(Family::Tasks),
            "invoices" => Ok(Family::Invoices),
            "gigs" => Ok(Family::Gigs),
            "users" => Ok(Family::Users),
            "organizations" => Ok(Family::Organizations),
            other => Err(StoreError::Validation(format!(
                "unknown entity family {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn resolution_is_stable_and_date_derived() {
        let created = Utc.with_ymd_and_hms(2025, 3, 7, 14, 30, 0).unwrap();
        let data_dir = PathBuf::from("/srv/data");

        let first = Family::Projects.resolve(&data_dir, "P-100", created);
        let second = Family::Projects.resolve(&data_dir, "P-100", created);
        assert_eq!(first, second);
        assert_eq!(
            first,
            PathBuf::from("/srv/data/projects/2025/March/07/P-100/project.json")
        );
    }

    #[test]
    fn account_families_use_numeric_months() {
        let created = Utc.with_ymd_and_hms(2024, 11, 2, 0, 0, 0).unwrap();
        assert_eq!(
            Family::Users.resolve_relative("u-9", created),
            "users/2024/11/02/u-9/user.json"
        );
        assert_eq!(
            Family::Invoices.resolve_relative("INV-1", created),
            "invoices/2024/November/02/INV-1/invoice.json"
        );
    }

    #[test]
    fn relative_and_absolute_derivations_agree() {
        let created = Utc.with_ymd_and_hms(2023, 1, 31, 23, 59, 59).unwrap();
        let data_dir = PathBuf::from("/d");
        for family in Family::ALL {
            let absolute = family.resolve(&data_dir, "e-1", created);
            let relative = family.resolve_relative("e-1", created);
            assert_eq!(absolute, data_dir.join(&relative));
        }
    }
}
