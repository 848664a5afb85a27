//! Widgetforge: Datasources to Dashboard Widgets
//!
//! A queued language-model pipeline. It discovers the resources of configured REST
//! datasources, synthesizes one OpenAPI specification for them, proposes widget ideas
//! against that specification and generates widget code for each idea. Every stage runs
//! as a background job whose state is polled from a durable job store.

pub mod cli;
pub mod config;
pub mod datasource;
pub mod documents;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod pipeline;
pub mod provider;
