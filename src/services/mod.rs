pub mod courier;
pub mod leads;
pub mod orders;
pub mod payment_plan;

pub use courier::CourierGateway;
pub use leads::{LeadCaptureService, LeadCaptureSettings, LeadSaveOutcome, RejectReason, SkipReason};
pub use orders::{OrderAssembler, OrderItemInput, OrderSettings, PlaceOrderInput};
pub use payment_plan::PaymentPlan;
