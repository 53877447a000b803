//! Dereplicates comparative gene-cluster search hits. Hits backed by
//! near-identical genome assemblies are collapsed to the hits of one
//! representative genome per similarity cluster; everything dropped or
//! retained by default is accounted for in the run summary.

pub mod acquire;
pub mod app;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod ncbi;
pub mod reconcile;
pub mod report;
pub mod resolver;
pub mod store;
pub mod table;
