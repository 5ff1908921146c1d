//! Aggregated API server presenting `Namespace`s as OpenShift-style `Project`s.

pub mod cluster;
pub mod crd;
pub mod selector;
pub mod server;
pub mod storage;
pub mod table;
pub mod translate;
pub mod watch;
