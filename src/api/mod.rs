//! HTTP API: wire models, handlers and the router

pub mod handlers;
pub mod models;
pub mod routes;
