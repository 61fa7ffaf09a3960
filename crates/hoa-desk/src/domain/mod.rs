//! Persisted records and the enums that describe their state.

mod buildings;
mod documents;
mod fees;
mod invoices;
mod leases;
mod users;
mod vehicles;

pub use buildings::{Building, Unit, UnitOwner, UnitStatus};
pub use documents::{Document, DocumentLinks, DocumentTemplate};
pub use fees::{Fee, FeeFrequency, FeeScope, FeeStatus};
pub use invoices::{Invoice, InvoicePenalty, InvoiceSource, InvoiceStatus, Payment, PaymentMethod};
pub use leases::{Lease, LeaseStatus};
pub use users::{AccessToken, Role, User};
pub use vehicles::{normalize_plate, Vehicle};
