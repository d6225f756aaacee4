//! HTTP handlers, one module per resource.

pub mod customers;
pub mod dashboard;
pub mod device_control;
pub mod overrides;
