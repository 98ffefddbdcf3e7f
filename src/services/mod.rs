pub mod approvals;
pub mod conflicts;
pub mod custody;
pub mod markings;
pub mod peminjaman;
pub mod quota;
