use std::{thread, time::Duration};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::{Config, RetryConfig},
    entities::{
        Invoice, InvoiceStatus, InvoicingMethod, Milestone, PaymentDetails, Project,
        ProjectStatus, Task, TaskStatus,
    },
    error::{Result, StoreError},
    money::{split_fee, FeeSchedule, Money},
    notifications::gateway::{NotificationGateway, PaymentFact},
    store::StorageClient,
};

/// Bounded exponential backoff for invoice generation. Only transient
/// storage failures are retried; validation failures propagate immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: u32,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            backoff_multiplier: config.backoff_multiplier.max(1),
            max_delay_ms: config.max_delay_ms,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (1-based attempt that just failed),
    /// capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = (self.backoff_multiplier as u64).saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaidSummary {
    pub invoice_number: String,
    pub freelancer_amount: Money,
    pub platform_fee: Money,
    pub new_paid_to_date: Money,
}

/// Marking an already-settled invoice paid is a no-op success, not an
/// error; callers can tell which case they hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum MarkPaidOutcome {
    Paid(PaidSummary),
    AlreadyPaid(PaidSummary),
}

impl MarkPaidOutcome {
    pub fn summary(&self) -> &PaidSummary {
        match self {
            MarkPaidOutcome::Paid(summary) | MarkPaidOutcome::AlreadyPaid(summary) => summary,
        }
    }
}

/// Drives the invoice state machine (`draft → sent → paid`, drafts may be
/// discarded) and the money math around it: fee splits, wallet crediting,
/// project totals, and payment notifications.
pub struct ReconciliationService<'a> {
    storage: &'a StorageClient,
    freelance_fee_basis_points: u32,
    storefront_fee_basis_points: u32,
    retry: RetryPolicy,
}

impl<'a> ReconciliationService<'a> {
    pub fn new(storage: &'a StorageClient, config: &Config) -> Self {
        Self {
            storage,
            freelance_fee_basis_points: config.freelance_fee_basis_points,
            storefront_fee_basis_points: config.storefront_fee_basis_points,
            retry: config.retry.clone().into(),
        }
    }

    fn basis_points(&self, schedule: FeeSchedule) -> u32 {
        match schedule {
            FeeSchedule::Freelance => self.freelance_fee_basis_points,
            FeeSchedule::Storefront => self.storefront_fee_basis_points,
        }
    }

    /// Task ids already bound by a non-draft, non-discarded invoice of the
    /// project. These may not be billed again.
    fn bound_task_ids(&self, project_id: &str, exclude_invoice: Option<&str>) -> Result<Vec<String>> {
        let mut bound = Vec::new();
        for invoice in self.storage.invoices.list_all()? {
            if invoice.project_id != project_id || !invoice.binds_tasks() {
                continue;
            }
            if exclude_invoice == Some(invoice.id.as_str()) {
                continue;
            }
            bound.extend(invoice.task_refs().map(str::to_string));
        }
        Ok(bound)
    }

    /// `draft → sent`. Requires a positive total and at least one task
    /// reference that no other non-draft invoice of the project already
    /// carries.
    pub fn send_invoice(&self, invoice_id: &str) -> Result<Invoice> {
        let invoice = self
            .storage
            .invoices
            .read(invoice_id)?
            .ok_or_else(|| StoreError::not_found("invoices", invoice_id))?;

        if invoice.discarded {
            return Err(StoreError::Validation(
                "a discarded draft can never be sent".into(),
            ));
        }
        match invoice.status {
            InvoiceStatus::Draft => {}
            InvoiceStatus::Sent | InvoiceStatus::Paid => {
                return Err(StoreError::AlreadyExists(format!(
                    "invoice {invoice_id} was already sent"
                )));
            }
        }
        if invoice.total_amount <= Money::ZERO {
            return Err(StoreError::Validation(
                "an invoice must have a positive total before it is sent".into(),
            ));
        }
        if invoice.fee_schedule == FeeSchedule::Freelance {
            let refs: Vec<&str> = invoice.task_refs().collect();
            if refs.is_empty() {
                return Err(StoreError::Validation(
                    "a freelance invoice needs at least one task reference".into(),
                ));
            }
            let bound = self.bound_task_ids(&invoice.project_id, Some(&invoice.id))?;
            for task_id in refs {
                if bound.iter().any(|existing| existing == task_id) {
                    return Err(StoreError::Validation(format!(
                        "task {task_id} is already billed by another invoice"
                    )));
                }
            }
        }

        self.storage.invoices.update(invoice_id, |invoice| {
            invoice.status = InvoiceStatus::Sent;
            Ok(())
        })
    }

    /// Discards a draft. Discarded drafts never transition again.
    pub fn discard_draft(&self, invoice_id: &str) -> Result<Invoice> {
        self.storage.invoices.update(invoice_id, |invoice| {
            if invoice.status != InvoiceStatus::Draft {
                return Err(StoreError::Validation(
                    "only draft invoices can be discarded".into(),
                ));
            }
            invoice.discarded = true;
            Ok(())
        })
    }

    /// `sent → paid`, the terminal transition. The sequence is
    /// invoice-update → wallet-credit → project-update → notification-emit;
    /// each step is durable before the next begins and each step checks for
    /// its own prior effect, so re-running after a crash resumes instead of
    /// double-crediting. There is no cross-file transaction.
    pub fn mark_invoice_paid(&self, invoice_id: &str) -> Result<MarkPaidOutcome> {
        let invoice = self
            .storage
            .invoices
            .read(invoice_id)?
            .ok_or_else(|| StoreError::not_found("invoices", invoice_id))?;

        if invoice.discarded {
            return Err(StoreError::Validation(
                "a discarded draft can never be paid".into(),
            ));
        }
        if invoice.status == InvoiceStatus::Draft {
            return Err(StoreError::Validation(
                "an invoice must be sent before it can be paid".into(),
            ));
        }
        // A freelance settlement needs its project for the totals step;
        // checked here, before any state has moved.
        if invoice.fee_schedule == FeeSchedule::Freelance
            && self.storage.projects.read(&invoice.project_id)?.is_none()
        {
            return Err(StoreError::not_found("projects", &invoice.project_id));
        }

        let split = split_fee(
            invoice.total_amount,
            self.basis_points(invoice.fee_schedule),
        );
        let was_paid = invoice.status == InvoiceStatus::Paid;

        if !was_paid {
            self.storage.invoices.update(invoice_id, |invoice| {
                invoice.status = InvoiceStatus::Paid;
                invoice.payment_details = Some(PaymentDetails {
                    platform_fee: split.platform_fee,
                    freelancer_amount: split.remainder,
                });
                Ok(())
            })?;
        }

        let credited_now = self.storage.wallet.credit_once(
            &invoice.freelancer_id,
            split.remainder,
            &invoice.project_id,
            &invoice.invoice_number,
            Utc::now(),
        )?;

        // paidToDate carries the sum of the project's settled invoice
        // totals. Recomputing that sum makes this step idempotent on its
        // own: a rerun after a crash between the wallet credit and this
        // update still advances the total, and a fully settled invoice
        // advances nothing.
        let new_paid_to_date = match self.storage.projects.read(&invoice.project_id)? {
            Some(project) => {
                let settled = self.settled_total(&invoice.project_id)?;
                if project.paid_to_date == settled {
                    project.paid_to_date
                } else {
                    let updated =
                        self.storage.projects.update(&invoice.project_id, |project| {
                            project.paid_to_date = settled;
                            Ok(())
                        })?;
                    let remaining = self.remaining_budget(&updated)?;
                    debug!(
                        project_id = %updated.id,
                        paid_to_date = %updated.paid_to_date,
                        %remaining,
                        "project totals advanced"
                    );
                    updated.paid_to_date
                }
            }
            // Storefront sales settle outside a project budget.
            None => Money::ZERO,
        };

        self.notify_payment(&invoice)?;

        let summary = PaidSummary {
            invoice_number: invoice.invoice_number.clone(),
            freelancer_amount: split.remainder,
            platform_fee: split.platform_fee,
            new_paid_to_date,
        };

        if was_paid && !credited_now {
            info!(invoice_id, "invoice already settled, no-op");
            Ok(MarkPaidOutcome::AlreadyPaid(summary))
        } else {
            info!(
                invoice_id,
                freelancer_amount = %summary.freelancer_amount,
                platform_fee = %summary.platform_fee,
                "invoice marked paid"
            );
            Ok(MarkPaidOutcome::Paid(summary))
        }
    }

    fn notify_payment(&self, invoice: &Invoice) -> Result<()> {
        let gateway = NotificationGateway::new(self.storage);
        let fact = PaymentFact {
            actor_id: invoice.commissioner_id.clone(),
            target_id: invoice.freelancer_id.clone(),
            project_id: invoice.project_id.clone(),
            invoice_number: invoice.invoice_number.clone(),
            amount: invoice.total_amount,
        };
        match gateway.enrich(&fact)? {
            Some(enriched) => {
                let created = gateway.emit_milestone_payment_notifications(&enriched)?;
                debug!(created, invoice_number = %invoice.invoice_number, "payment notifications emitted");
            }
            None => {
                warn!(
                    invoice_number = %invoice.invoice_number,
                    "payment notification skipped: enrichment incomplete"
                );
            }
        }
        Ok(())
    }

    /// The remaining budget a notification or report should display.
    /// Completion method: whatever of the budget is not yet paid out.
    /// Milestone method: the per-milestone rate times the outstanding
    /// (not yet billed) milestone count.
    pub fn remaining_budget(&self, project: &Project) -> Result<Money> {
        match project.invoicing_method {
            InvoicingMethod::Completion => Ok(project.remaining_budget()),
            InvoicingMethod::Milestone => {
                let tasks = self.project_tasks(&project.id)?;
                if tasks.is_empty() {
                    return Ok(project.remaining_budget());
                }
                let rate = project.total_budget.divide(tasks.len() as u64);
                let bound = self.bound_task_ids(&project.id, None)?;
                let outstanding = tasks
                    .iter()
                    .filter(|task| !bound.iter().any(|id| id == &task.id))
                    .count();
                Ok(rate.times(outstanding as u64))
            }
        }
    }

    /// Sum of the project's settled invoice totals; the value `paidToDate`
    /// must carry.
    fn settled_total(&self, project_id: &str) -> Result<Money> {
        Ok(self
            .storage
            .invoices
            .list_all()?
            .into_iter()
            .filter(|invoice| {
                invoice.project_id == project_id && invoice.status == InvoiceStatus::Paid
            })
            .map(|invoice| invoice.total_amount)
            .sum())
    }

    fn project_tasks(&self, project_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .storage
            .tasks
            .list_all()?
            .into_iter()
            .filter(|task| task.project_id == project_id)
            .collect())
    }

    /// Builds a draft invoice from the project's approved-but-unbilled
    /// tasks. Completion method: the rate divides the post-upfront pool
    /// across every task not yet billed. Milestone method: the rate divides
    /// the total budget across all tasks.
    pub fn generate_invoice(&self, project_id: &str) -> Result<Invoice> {
        let project = self
            .storage
            .projects
            .read(project_id)?
            .ok_or_else(|| StoreError::not_found("projects", project_id))?;
        let tasks = self.project_tasks(project_id)?;
        if tasks.is_empty() {
            return Err(StoreError::Validation(format!(
                "project {project_id} has no tasks to invoice"
            )));
        }

        // Draft invoices also block regeneration; otherwise every retry of
        // this call would mint another identical draft.
        let mut referenced = Vec::new();
        for invoice in self.storage.invoices.list_all()? {
            if invoice.project_id == project_id && !invoice.discarded {
                referenced.extend(invoice.task_refs().map(str::to_string));
            }
        }

        let eligible: Vec<&Task> = tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Approved)
            .filter(|task| !referenced.iter().any(|id| id == &task.id))
            .collect();
        if eligible.is_empty() {
            return Err(StoreError::Validation(format!(
                "project {project_id} has no approved unbilled tasks"
            )));
        }

        let rate_per_task = match project.invoicing_method {
            InvoicingMethod::Completion => {
                let pool = project.total_budget
                    - project.upfront_commitment.unwrap_or(Money::ZERO);
                let unbilled = tasks
                    .iter()
                    .filter(|task| !referenced.iter().any(|id| id == &task.id))
                    .count();
                pool.divide(unbilled as u64)
            }
            InvoicingMethod::Milestone => project.total_budget.divide(tasks.len() as u64),
        };

        let sequence = self
            .storage
            .invoices
            .list_all()?
            .iter()
            .filter(|invoice| invoice.project_id == project_id)
            .count()
            + 1;
        let invoice_number = format!("INV-{project_id}-{sequence:03}");

        let invoice = Invoice {
            id: invoice_number.clone(),
            created_at: Utc::now(),
            invoice_number,
            project_id: project_id.to_string(),
            freelancer_id: project.freelancer_id.clone(),
            commissioner_id: project.commissioner_id.clone(),
            status: InvoiceStatus::Draft,
            discarded: false,
            fee_schedule: FeeSchedule::Freelance,
            total_amount: rate_per_task.times(eligible.len() as u64),
            payment_details: None,
            milestones: eligible
                .iter()
                .map(|task| Milestone {
                    title: task.title.clone(),
                    amount: rate_per_task,
                    task_id: Some(task.id.clone()),
                })
                .collect(),
            archived: false,
        };
        self.storage.invoices.create(&invoice)?;
        Ok(invoice)
    }

    /// Retry driver around `generate_invoice`. Retries only transient
    /// storage failures; after exhausting the policy it reports the attempt
    /// count and the last error instead of swallowing either.
    pub fn generate_invoice_with_retry(&self, project_id: &str) -> Result<Invoice> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.generate_invoice(project_id) {
                Ok(invoice) => return Ok(invoice),
                Err(err) if err.is_transient() => {
                    if attempt >= self.retry.max_attempts {
                        return Err(StoreError::RetryExhausted {
                            attempts: attempt,
                            last_error: err.to_string(),
                        });
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        project_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %err,
                        "invoice generation failed transiently, retrying"
                    );
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// A project is completed exactly when every one of its tasks is
    /// approved. Flips the status both ways, but never resurrects an
    /// archived project.
    pub fn refresh_project_status(&self, project_id: &str) -> Result<Project> {
        let tasks = self.project_tasks(project_id)?;
        let all_approved =
            !tasks.is_empty() && tasks.iter().all(|task| task.status == TaskStatus::Approved);
        self.storage.projects.update(project_id, |project| {
            if project.archived {
                return Ok(());
            }
            project.status = match (all_approved, project.status) {
                (true, _) => ProjectStatus::Completed,
                (false, ProjectStatus::Completed) => ProjectStatus::Ongoing,
                (false, current) => current,
            };
            Ok(())
        })
    }
}
