use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    document,
    error::Result,
    money::Money,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WalletHistory {
    transactions: Vec<WalletTransaction>,
}

/// The append-oriented earnings ledger at `data/wallet/wallet-history.json`.
///
/// The whole history lives in one document, so appends are read-modify-write
/// behind a mutex; the file itself is still replaced atomically.
pub struct WalletLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl WalletLedger {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("wallet").join("wallet-history.json"),
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<WalletHistory> {
        Ok(document::read_json(&self.path)?.unwrap_or_default())
    }

    pub fn append(&self, transaction: WalletTransaction) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut history = self.load()?;
        history.transactions.push(transaction);
        document::write_json(&self.path, &history)
    }

    /// Credits a user once per invoice number. Returns `true` when a new
    /// transaction was written, `false` when a credit for that invoice was
    /// already present; this is the idempotency check mark-paid relies on.
    pub fn credit_once(
        &self,
        user_id: &str,
        amount: Money,
        project_id: &str,
        invoice_number: &str,
        date: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut history = self.load()?;
        let existing = history.transactions.iter().any(|tx| {
            tx.kind == TransactionKind::Credit
                && tx.invoice_number.as_deref() == Some(invoice_number)
        });
        if existing {
            debug!(invoice_number, "wallet credit already recorded, skipping");
            return Ok(false);
        }
        history.transactions.push(WalletTransaction {
            user_id: user_id.to_string(),
            kind: TransactionKind::Credit,
            amount,
            project_id: Some(project_id.to_string()),
            invoice_number: Some(invoice_number.to_string()),
            date,
        });
        document::write_json(&self.path, &history)?;
        Ok(true)
    }

    pub fn find_credit(&self, invoice_number: &str) -> Result<Option<WalletTransaction>> {
        Ok(self.load()?.transactions.into_iter().find(|tx| {
            tx.kind == TransactionKind::Credit
                && tx.invoice_number.as_deref() == Some(invoice_number)
        }))
    }

    pub fn list(&self, user_id: Option<&str>) -> Result<Vec<WalletTransaction>> {
        let history = self.load()?;
        Ok(match user_id {
            Some(user_id) => history
                .transactions
                .into_iter()
                .filter(|tx| tx.user_id == user_id)
                .collect(),
            None => history.transactions,
        })
    }

    pub fn balance(&self, user_id: &str) -> Result<Money> {
        Ok(self
            .list(Some(user_id))?
            .into_iter()
            .map(|tx| match tx.kind {
                TransactionKind::Credit => tx.amount,
                TransactionKind::Debit => Money::ZERO - tx.amount,
            })
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_once_is_idempotent_per_invoice() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = WalletLedger::open(dir.path());
        let now = Utc::now();

        let first = ledger
            .credit_once("u-f", Money::from_cents(166_091), "P-1", "INV-1", now)
            .unwrap();
        let second = ledger
            .credit_once("u-f", Money::from_cents(166_091), "P-1", "INV-1", now)
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(ledger.list(Some("u-f")).unwrap().len(), 1);
    }

    #[test]
    fn balance_nets_credits_and_debits() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = WalletLedger::open(dir.path());
        let now = Utc::now();

        ledger
            .credit_once("u-f", Money::from_units(100), "P-1", "INV-1", now)
            .unwrap();
        ledger
            .append(WalletTransaction {
                user_id: "u-f".into(),
                kind: TransactionKind::Debit,
                amount: Money::from_units(40),
                project_id: None,
                invoice_number: None,
                date: now,
            })
            .unwrap();

        assert_eq!(ledger.balance("u-f").unwrap(), Money::from_units(60));
        assert_eq!(ledger.balance("u-other").unwrap(), Money::ZERO);
    }

    #[test]
    fn transaction_uses_the_wire_field_names() {
        let tx = WalletTransaction {
            user_id: "u-f".into(),
            kind: TransactionKind::Credit,
            amount: Money::from_cents(4_275),
            project_id: Some("P-1".into()),
            invoice_number: Some("INV-1".into()),
            date: Utc::now(),
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "credit");
        assert_eq!(json["userId"], "u-f");
        assert_eq!(json["invoiceNumber"], "INV-1");
    }
}
