use chrono::NaiveDate;

use crate::store::Database;

/// Next number in the `{prefix}-{YYYYMM}-{NNNNNN}` sequence for `issue_date`.
///
/// Soft-deleted invoices still hold their numbers. Only call this inside a
/// [`crate::store::Store::transaction`]: the store lock is what keeps two
/// concurrent callers from reading the same highest suffix.
pub fn next_invoice_number(db: &Database, prefix: &str, issue_date: NaiveDate) -> String {
    let stem = format!("{prefix}-{}-", issue_date.format("%Y%m"));
    let highest = db
        .invoices
        .with_trashed()
        .filter_map(|invoice| invoice.invoice_number.strip_prefix(stem.as_str()))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{stem}{:06}", highest + 1)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::services::testing::{date, money, noon, Harness};
    use crate::services::NewInvoice;

    fn manual(unit_id: u64) -> NewInvoice {
        NewInvoice {
            unit_id,
            billed_to: None,
            source: None,
            billing_period: None,
            description: "Key replacement".to_string(),
            amount: money(25),
            issue_date: None,
            due_date: None,
            notes: None,
        }
    }

    #[test]
    fn numbers_increase_within_a_month_and_reset_in_the_next() {
        let harness = Harness::at(noon(2026, 1, 30));
        let building = harness.building("Cedar Court");
        let unit = harness.unit(building.meta.id, "A1");
        let invoices = &harness.services.invoices;

        let first = invoices.create(manual(unit.meta.id)).expect("first");
        let second = invoices.create(manual(unit.meta.id)).expect("second");
        assert_eq!(first.invoice_number, "INV-202601-000001");
        assert_eq!(second.invoice_number, "INV-202601-000002");

        // A deleted invoice keeps its number reserved.
        invoices.delete(second.meta.id).expect("delete");
        let third = invoices.create(manual(unit.meta.id)).expect("third");
        assert_eq!(third.invoice_number, "INV-202601-000003");

        harness.clock.set(noon(2026, 2, 1));
        let february = invoices.create(manual(unit.meta.id)).expect("february");
        assert_eq!(february.invoice_number, "INV-202602-000001");
    }

    #[test]
    fn prefix_follows_the_issue_date() {
        let harness = Harness::at(noon(2026, 3, 2));
        let building = harness.building("Cedar Court");
        let unit = harness.unit(building.meta.id, "A1");
        let mut backdated = manual(unit.meta.id);
        backdated.issue_date = Some(date(2025, 12, 31));
        backdated.due_date = Some(date(2026, 1, 15));

        let invoice = harness.services.invoices.create(backdated).expect("create");
        assert_eq!(invoice.invoice_number, "INV-202512-000001");
    }

    #[test]
    fn concurrent_creation_never_collides() {
        let harness = Harness::new();
        let building = harness.building("Cedar Court");
        let unit_id = harness.unit(building.meta.id, "A1").meta.id;
        let invoices = Arc::new(harness.services.invoices.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let invoices = Arc::clone(&invoices);
                thread::spawn(move || {
                    (0..5)
                        .map(|_| {
                            invoices
                                .create(manual(unit_id))
                                .expect("create")
                                .invoice_number
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut numbers: Vec<String> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("thread"))
            .collect();
        numbers.sort();
        let expected: Vec<String> = (1..=40).map(|n| format!("INV-202603-{n:06}")).collect();
        assert_eq!(numbers, expected);
    }

    #[test]
    fn ignores_foreign_prefixes() {
        let harness = Harness::new();
        let db = harness.store.read(Clone::clone).expect("read");
        assert_eq!(
            next_invoice_number(&db, "HOA", date(2026, 3, 10)),
            "HOA-202603-000001"
        );
    }
}
