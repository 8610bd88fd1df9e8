// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cluster coordination for a set-oriented distributed store: the catalog,
//! command broadcast to storage nodes, and proxied distributed scans.

pub mod core;
