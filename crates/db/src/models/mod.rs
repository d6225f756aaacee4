//! Row types and their conversion into domain records.

pub mod command;
pub mod customer;
