//! HTTP API: routing, bearer-token middleware and error mapping.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
