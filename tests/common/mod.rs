#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use marketfs::{
    config::Config,
    entities::{
        Invoice, InvoiceStatus, InvoicingMethod, Milestone, Organization, Project, ProjectStatus,
        Task, TaskStatus, User,
    },
    money::{FeeSchedule, Money},
    store::StorageClient,
};

pub fn test_config(tmp: &TempDir) -> Config {
    Config {
        data_dir: tmp.path().join("data"),
        legacy_dir: tmp.path().join("legacy"),
        ..Config::default()
    }
}

pub fn created() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap()
}

pub fn project(id: &str, method: InvoicingMethod) -> Project {
    Project {
        id: id.into(),
        created_at: created(),
        title: "Brand refresh".into(),
        status: ProjectStatus::Ongoing,
        invoicing_method: method,
        total_budget: Money::from_units(5_000),
        upfront_commitment: match method {
            InvoicingMethod::Completion => Some(Money::from_units(600)),
            InvoicingMethod::Milestone => None,
        },
        paid_to_date: Money::ZERO,
        freelancer_id: "u-free".into(),
        commissioner_id: "u-comm".into(),
        organization_id: "org-1".into(),
        archived: false,
    }
}

pub fn task(id: &str, project_id: &str, status: TaskStatus) -> Task {
    Task {
        id: id.into(),
        created_at: created(),
        project_id: project_id.into(),
        title: format!("Task {id}"),
        status,
        completed: matches!(status, TaskStatus::Approved | TaskStatus::InReview),
        rejected: status == TaskStatus::Rejected,
        archived: false,
    }
}

pub fn user(id: &str, name: &str) -> User {
    User {
        id: id.into(),
        created_at: created(),
        name: name.into(),
        archived: false,
    }
}

pub fn organization(id: &str) -> Organization {
    Organization {
        id: id.into(),
        created_at: created(),
        name: "Acme Studio".into(),
        logo_url: Some("https://example.com/logo.png".into()),
        archived: false,
    }
}

pub fn sent_invoice(id: &str, project_id: &str, total: Money, task_id: &str) -> Invoice {
    Invoice {
        id: id.into(),
        created_at: created(),
        invoice_number: id.into(),
        project_id: project_id.into(),
        freelancer_id: "u-free".into(),
        commissioner_id: "u-comm".into(),
        status: InvoiceStatus::Sent,
        discarded: false,
        fee_schedule: FeeSchedule::Freelance,
        total_amount: total,
        payment_details: None,
        milestones: vec![Milestone {
            title: format!("Milestone for {task_id}"),
            amount: total,
            task_id: Some(task_id.into()),
        }],
        archived: false,
    }
}

/// Seeds the lookups the notification gateway joins against.
pub fn seed_parties(storage: &StorageClient) {
    storage.users.create(&user("u-free", "Freya Lancer")).unwrap();
    storage.users.create(&user("u-comm", "Cornelius Payer")).unwrap();
    storage.organizations.create(&organization("org-1")).unwrap();
}
