//! stageflow_core — staging ETL pipeline for the product dimension model
//!
//! This crate implements a scheduled extract → normalize → merge pipeline:
//! a fixed catalog of dimension tables is copied verbatim from a relational
//! source into raw staging tables, each raw table is cleaned by a data-driven
//! normalizer (column selection, null fills, renames), and the cleaned tables
//! are inner-joined into one denormalized product-model table. Every table
//! write is a full replace, so reruns are idempotent by construction.
//!
//! Basic usage:
//!
//! ```no_run
//! use stageflow_core::config::types::FlowConfig;
//! use stageflow_core::engine::FlowEngine;
//! use stageflow_core::pipeline::product_model_pipeline;
//!
//! # async fn run() {
//! let cfg = FlowConfig::example();
//! let (trigger, def) = product_model_pipeline(&cfg).unwrap();
//! let engine = FlowEngine::new()
//!     .run_log(&cfg.run_log)
//!     .add_pipeline(trigger, def);
//! engine.run().await.unwrap();
//! # }
//! ```

pub mod catalog;
pub mod source;
pub mod staging;
pub mod sql;
pub mod stage;
pub mod stages;
pub mod dag;
pub mod events;
pub mod store;
pub mod scheduler;
pub mod config;
pub mod builder;
pub mod pipeline;
pub mod engine;

pub mod logging;

pub mod metrics;
