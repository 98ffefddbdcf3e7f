//! Database entities for the reservation and custody domain.
//!
//! Status fields are stored as strings with typed enums alongside each model,
//! following the `as_str`/`from_str` convention used throughout the services.

pub mod approval_step;
pub mod global_approver;
pub mod marking;
pub mod peminjaman;
pub mod peminjaman_item;
pub mod prasarana;
pub mod resource_approver;
pub mod sarana;
pub mod sarana_unit;
pub mod unit_assignment;
