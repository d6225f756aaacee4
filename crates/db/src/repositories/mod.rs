//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod customer_repo;
pub mod device_command_repo;

pub use customer_repo::CustomerRepo;
pub use device_command_repo::DeviceCommandRepo;
