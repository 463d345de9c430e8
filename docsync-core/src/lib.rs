#![doc = "docsync-core: core engine library for docsync."]

//! This crate contains all open-source logic, data models and pipelines for docsync.
//! Backend-specific HTTP clients and CLI wiring live in the `docsync` binary crate.
//! Begin new modules as submodules below.
//!
//! # Usage
//! Add this as a dependency for all shared sync-engine, state, hierarchy and
//! media-cache code.

pub mod config;
pub mod contract;
pub mod convert;
pub mod detect;
pub mod error;
pub mod hierarchy;
pub mod media;
pub mod retry;
pub mod scan;
pub mod state;
pub mod synchronise;
