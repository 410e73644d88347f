//! issuecrawl - incremental issue-tracker history crawler
//!
//! This crate pulls issues, comments, attachments and field-level change
//! history from heterogeneous trackers, normalises them into one entity
//! model and persists them idempotently so repeated runs only add new data.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Crawl configuration loading and path resolution
//! - [`model`] - Entity types (Identity, Tracker, Issue, Comment, Attachment, Change)
//! - [`decode`] - CSV/HTML/XML/JSON format decoders
//! - [`changelog`] - Change-log reconstruction engine
//! - [`identity`] - Concurrent identity cache
//! - [`storage`] - Generic key-addressable store and its SQLite implementation
//! - [`persist`] - Idempotent persistence layer (dedup keys, unit of work)
//! - [`sync`] - Checkpoints, retry policy and the synchronization orchestrator
//! - [`backends`] - Tracker adapters and issue parsers
//! - [`http`] - Shared HTTP client for tracker adapters
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backends;
pub mod changelog;
pub mod cli;
pub mod config;
pub mod decode;
pub mod error;
pub mod http;
pub mod identity;
pub mod model;
pub mod persist;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
