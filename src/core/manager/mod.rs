// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Manager
//!
//! The manager owns the catalog and the node registry. It accepts client
//! requests, drives broadcasts and scans, and keeps the catalog consistent
//! with what the storage nodes acknowledged.

pub mod client;
pub mod handler;
pub mod server;

pub use client::{ManagerClient, ScanEnd, SetScanReader};
pub use handler::RequestHandler;
pub use server::{ManagerHandle, ManagerServer};
