pub mod annotate;
pub mod annotations;
pub mod app;
pub mod classify;
pub mod config;
pub mod domain;
pub mod error;
pub mod link;
pub mod manifest;
pub mod output;
pub mod qc;
pub mod query;
pub mod rules;
pub mod samplesheet;
pub mod schema;
pub mod submit;
pub mod synapse;
pub mod table;
