//! OData module
//!
//! HTTP client for Business Central data endpoints

pub mod client;

pub use client::{BcClient, CompanyList, ODataError};
