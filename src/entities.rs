use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    error::{Result, StoreError},
    money::{FeeSchedule, Money},
    paths::Family,
};

pub const MAX_ENTITY_ID_LENGTH: usize = 128;

static ENTITY_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9_-]{0,127})?$").expect("valid entity id regex")
});

pub fn ensure_entity_id(label: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{label} must not be empty")));
    }
    if value.len() > MAX_ENTITY_ID_LENGTH {
        return Err(StoreError::Validation(format!(
            "{label} cannot exceed {MAX_ENTITY_ID_LENGTH} characters"
        )));
    }
    if !ENTITY_ID_RE.is_match(value) {
        return Err(StoreError::Validation(format!(
            "{label} may only contain alphanumerics, dashes, and underscores"
        )));
    }
    Ok(())
}

fn ensure_non_negative(label: &str, amount: Money) -> Result<()> {
    if amount.is_negative() {
        return Err(StoreError::Validation(format!(
            "{label} must not be negative"
        )));
    }
    Ok(())
}

/// A persisted record belonging to one entity family.
///
/// `validate` runs at the storage boundary: invalid documents are rejected
/// before any file is touched, never defended against downstream.
pub trait Entity: Serialize + DeserializeOwned + Clone {
    const FAMILY: Family;

    fn id(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn archived(&self) -> bool;
    fn set_archived(&mut self, archived: bool);
    fn validate(&self) -> Result<()>;
}

fn is_false(value: &bool) -> bool {
    !value
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Ongoing,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoicingMethod {
    Milestone,
    Completion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub status: ProjectStatus,
    pub invoicing_method: InvoicingMethod,
    pub total_budget: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upfront_commitment: Option<Money>,
    pub paid_to_date: Money,
    pub freelancer_id: String,
    pub commissioner_id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub archived: bool,
}

impl Project {
    pub fn remaining_budget(&self) -> Money {
        self.total_budget - self.paid_to_date
    }
}

impl Entity for Project {
    const FAMILY: Family = Family::Projects;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn archived(&self) -> bool {
        self.archived
    }

    fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
    }

    fn validate(&self) -> Result<()> {
        ensure_entity_id("project id", &self.id)?;
        ensure_entity_id("freelancer id", &self.freelancer_id)?;
        ensure_entity_id("commissioner id", &self.commissioner_id)?;
        ensure_entity_id("organization id", &self.organization_id)?;
        ensure_non_negative("total budget", self.total_budget)?;
        ensure_non_negative("paid to date", self.paid_to_date)?;
        match (self.invoicing_method, self.upfront_commitment) {
            (InvoicingMethod::Milestone, Some(_)) => Err(StoreError::Validation(
                "upfront commitment only applies to completion invoicing".into(),
            )),
            (InvoicingMethod::Completion, Some(upfront)) if upfront > self.total_budget => {
                Err(StoreError::Validation(
                    "upfront commitment cannot exceed the total budget".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Ongoing,
    #[serde(rename = "In review")]
    InReview,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub project_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub completed: bool,
    pub rejected: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub archived: bool,
}

impl Entity for Task {
    const FAMILY: Family = Family::Tasks;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn archived(&self) -> bool {
        self.archived
    }

    fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
    }

    fn validate(&self) -> Result<()> {
        ensure_entity_id("task id", &self.id)?;
        ensure_entity_id("project id", &self.project_id)?;
        if self.completed && self.rejected {
            return Err(StoreError::Validation(
                "a task cannot be both completed and rejected".into(),
            ));
        }
        if self.completed && self.status == TaskStatus::Ongoing {
            return Err(StoreError::Validation(
                "a completed task cannot still be ongoing".into(),
            ));
        }
        if self.status == TaskStatus::Rejected && (self.completed || !self.rejected) {
            return Err(StoreError::Validation(
                "a rejected task must carry the rejected flag and cannot be completed".into(),
            ));
        }
        if self.status == TaskStatus::Approved && !self.completed {
            return Err(StoreError::Validation(
                "an approved task must be completed".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub platform_fee: Money,
    pub freelancer_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub title: String,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub invoice_number: String,
    pub project_id: String,
    pub freelancer_id: String,
    pub commissioner_id: String,
    pub status: InvoiceStatus,
    #[serde(default, skip_serializing_if = "is_false")]
    pub discarded: bool,
    pub fee_schedule: FeeSchedule,
    pub total_amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<PaymentDetails>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub archived: bool,
}

impl Invoice {
    /// Task ids referenced by this invoice's milestones.
    pub fn task_refs(&self) -> impl Iterator<Item = &str> {
        self.milestones
            .iter()
            .filter_map(|milestone| milestone.task_id.as_deref())
    }

    /// Non-draft, non-discarded invoices are the ones that bind a task for
    /// double-billing purposes.
    pub fn binds_tasks(&self) -> bool {
        !self.discarded && self.status != InvoiceStatus::Draft
    }
}

impl Entity for Invoice {
    const FAMILY: Family = Family::Invoices;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn archived(&self) -> bool {
        self.archived
    }

    fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
    }

    fn validate(&self) -> Result<()> {
        ensure_entity_id("invoice id", &self.id)?;
        ensure_entity_id("project id", &self.project_id)?;
        if self.invoice_number.is_empty() {
            return Err(StoreError::Validation(
                "invoice number must not be empty".into(),
            ));
        }
        ensure_non_negative("invoice total", self.total_amount)?;
        if self.discarded && self.status != InvoiceStatus::Draft {
            return Err(StoreError::Validation(
                "only draft invoices can be discarded".into(),
            ));
        }
        for milestone in &self.milestones {
            ensure_non_negative("milestone amount", milestone.amount)?;
            if let Some(task_id) = &milestone.task_id {
                ensure_entity_id("milestone task id", task_id)?;
            }
        }
        match (&self.payment_details, self.status) {
            (Some(details), InvoiceStatus::Paid) => {
                if details.platform_fee + details.freelancer_amount != self.total_amount {
                    return Err(StoreError::Validation(
                        "platform fee and freelancer amount must sum to the invoice total".into(),
                    ));
                }
                Ok(())
            }
            (Some(_), _) => Err(StoreError::Validation(
                "payment details only exist on paid invoices".into(),
            )),
            (None, InvoiceStatus::Paid) => Err(StoreError::Validation(
                "a paid invoice must carry payment details".into(),
            )),
            (None, _) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GigStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gig {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub price: Money,
    pub seller_id: String,
    pub status: GigStatus,
}

impl Entity for Gig {
    const FAMILY: Family = Family::Gigs;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn archived(&self) -> bool {
        self.status == GigStatus::Archived
    }

    fn set_archived(&mut self, archived: bool) {
        self.status = if archived {
            GigStatus::Archived
        } else {
            GigStatus::Active
        };
    }

    fn validate(&self) -> Result<()> {
        ensure_entity_id("gig id", &self.id)?;
        ensure_entity_id("seller id", &self.seller_id)?;
        ensure_non_negative("gig price", self.price)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub archived: bool,
}

impl Entity for User {
    const FAMILY: Family = Family::Users;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn archived(&self) -> bool {
        self.archived
    }

    fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
    }

    fn validate(&self) -> Result<()> {
        ensure_entity_id("user id", &self.id)?;
        if self.name.trim().is_empty() {
            return Err(StoreError::Validation("user name must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub archived: bool,
}

impl Entity for Organization {
    const FAMILY: Family = Family::Organizations;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn archived(&self) -> bool {
        self.archived
    }

    fn set_archived(&mut self, archived: bool) {
        self.archived = archived;
    }

    fn validate(&self) -> Result<()> {
        ensure_entity_id("organization id", &self.id)?;
        if self.name.trim().is_empty() {
            return Err(StoreError::Validation(
                "organization name must not be empty".into(),
            ));
        }
        Ok(())
    }
}
