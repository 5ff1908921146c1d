//! A mock OAuth2 authorization server for development clusters.
//!
//! Implements just enough of the authorization-code flow for consoles and `oc login` to obtain a
//! real `ServiceAccount` token. No credentials are ever checked.

pub mod code_store;
pub mod login;
pub mod server;
pub mod token;
