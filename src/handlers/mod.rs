pub mod health;
pub mod leads;
pub mod orders;
pub mod parcels;
