use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::{
    error::Result,
    money::Money,
    notifications::{fingerprint, NotificationEvent},
    store::StorageClient,
};

pub const PAYER_EVENT_TYPE: &str = "milestone_payment_sent";
pub const RECIPIENT_EVENT_TYPE: &str = "milestone_payment_received";

/// A bare payment fact, as delivered by a webhook or the reconciliation
/// service. Ids and an amount; nothing display-ready.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentFact {
    pub actor_id: String,
    pub target_id: String,
    pub project_id: String,
    pub invoice_number: String,
    pub amount: Money,
}

/// The fact joined with everything a notification needs to render.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedPayment {
    pub fact: PaymentFact,
    pub project_title: String,
    pub remaining_budget: Money,
    pub payer_name: String,
    pub recipient_name: String,
    pub organization_name: String,
    pub organization_logo: Option<String>,
}

/// Turns payment facts into audience-specific notification events, at most
/// once per fact/audience pair.
pub struct NotificationGateway<'a> {
    storage: &'a StorageClient,
}

impl<'a> NotificationGateway<'a> {
    pub fn new(storage: &'a StorageClient) -> Self {
        Self { storage }
    }

    /// Joins the fact with project, user, and organization data. Any
    /// missing lookup yields `Ok(None)`: a skipped notification is less
    /// harmful than one rendered from placeholder data.
    pub fn enrich(&self, fact: &PaymentFact) -> Result<Option<EnrichedPayment>> {
        let Some(project) = self.storage.projects.read(&fact.project_id)? else {
            warn!(project_id = %fact.project_id, "enrichment missing project, cannot notify yet");
            return Ok(None);
        };
        let Some(payer) = self.storage.users.read(&fact.actor_id)? else {
            warn!(user_id = %fact.actor_id, "enrichment missing paying user, cannot notify yet");
            return Ok(None);
        };
        let Some(recipient) = self.storage.users.read(&fact.target_id)? else {
            warn!(user_id = %fact.target_id, "enrichment missing recipient user, cannot notify yet");
            return Ok(None);
        };
        let Some(organization) = self.storage.organizations.read(&project.organization_id)? else {
            warn!(
                organization_id = %project.organization_id,
                "enrichment missing organization, cannot notify yet"
            );
            return Ok(None);
        };

        Ok(Some(EnrichedPayment {
            fact: fact.clone(),
            project_title: project.title.clone(),
            remaining_budget: project.remaining_budget(),
            payer_name: payer.name,
            recipient_name: recipient.name,
            organization_name: organization.name,
            organization_logo: organization.logo_url,
        }))
    }

    /// Emits the payer-facing and recipient-facing events for one payment.
    /// Each side is fingerprinted and checked independently, so repeated
    /// webhook deliveries of the same payment append nothing new. A failure
    /// on one side degrades to a warning while the other side proceeds;
    /// the return value is the number of events actually created (0-2).
    pub fn emit_milestone_payment_notifications(
        &self,
        enriched: &EnrichedPayment,
    ) -> Result<usize> {
        let fact = &enriched.fact;
        let sides = [
            (PAYER_EVENT_TYPE, &fact.actor_id),
            (RECIPIENT_EVENT_TYPE, &fact.target_id),
        ];

        let mut created = 0;
        for (event_type, audience) in sides {
            let id = fingerprint(event_type, &fact.invoice_number, audience);
            match self.storage.notifications.exists(event_type, &id) {
                Ok(true) => {
                    debug!(event_type, invoice_number = %fact.invoice_number, "duplicate payment fact, skipping");
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(event_type, %err, "could not check notification fingerprint, skipping this side");
                    continue;
                }
            }

            let event = self.build_event(enriched, event_type, audience.clone());
            match self.storage.notifications.append(&event) {
                Ok(()) => created += 1,
                Err(err) => {
                    warn!(event_type, %err, "failed to append payment notification, other side proceeds");
                }
            }
        }
        Ok(created)
    }

    fn build_event(
        &self,
        enriched: &EnrichedPayment,
        event_type: &str,
        target_id: String,
    ) -> NotificationEvent {
        let fact = &enriched.fact;
        NotificationEvent {
            id: fingerprint(event_type, &fact.invoice_number, &target_id),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            actor_id: fact.actor_id.clone(),
            target_id,
            entity_type: "invoice".to_string(),
            entity_id: fact.invoice_number.clone(),
            metadata: json!({
                "projectId": fact.project_id,
                "invoiceNumber": fact.invoice_number,
                "amount": fact.amount,
            }),
            context: json!({
                "projectTitle": enriched.project_title,
                "remainingBudget": enriched.remaining_budget,
                "payerName": enriched.payer_name,
                "recipientName": enriched.recipient_name,
                "organizationName": enriched.organization_name,
                "organizationLogo": enriched.organization_logo,
            }),
        }
    }
}
