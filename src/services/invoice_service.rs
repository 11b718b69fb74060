use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::DataError;
use crate::models::{Invoice, InvoiceStatus};
use crate::services::Repository;

/// Totals over a set of invoices, by status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvoiceSummary {
    pub count: usize,
    pub total: Decimal,
    pub paid: Decimal,
    pub pending: Decimal,
    pub overdue: Decimal,
}

impl InvoiceSummary {
    pub fn from_invoices(invoices: &[Invoice]) -> Self {
        invoices.iter().fold(Self::default(), |mut summary, invoice| {
            summary.count += 1;
            summary.total += invoice.amount;
            match invoice.status {
                InvoiceStatus::Paid => summary.paid += invoice.amount,
                InvoiceStatus::Pending => summary.pending += invoice.amount,
                InvoiceStatus::Overdue => summary.overdue += invoice.amount,
            }
            summary
        })
    }
}

impl Repository<Invoice> {
    pub async fn get_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>, DataError> {
        let filter = Self::with_default_order(Self::base_filter()?.eq("status", status.as_str())?)?;
        self.select(filter).await
    }

    /// Invoices issued within `[from, to]`, both days included
    pub async fn get_by_issue_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Invoice>, DataError> {
        if to < from {
            return Err(DataError::validation("Range end precedes range start", None));
        }
        let filter = Self::base_filter()?
            .gte("issue_date", from.to_string())?
            .lte("issue_date", to.to_string())?;
        self.select(Self::with_default_order(filter)?).await
    }
}
