// Core models
pub mod lead;
pub mod order;
pub mod parcel;
pub mod payment_method;

pub use lead::{Lead, LeadInput, LeadItem, LeadItemInput, LeadStatus};
pub use order::{CustomerDetails, Order, OrderItem, PaymentStatus};
pub use parcel::{
    AuditOutcome, CourierAction, CourierAuditEntry, CourierParcel, ParcelRecord, ParcelState,
};
pub use payment_method::{PartialType, PaymentMethodRule};
