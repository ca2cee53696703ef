//! # cbuild - Incremental C/C++ Build Orchestrator
//!
//! cbuild compiles only the translation units whose inputs changed and then
//! links the result. A unit's inputs are the unit itself plus every header it
//! includes, transitively; each is fingerprinted by content, so touching a
//! file without editing it never triggers a rebuild.
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter cbuild.toml
//! cbuild init
//!
//! # Build the default profile with at most 8 parallel processes
//! cbuild build -n 8
//!
//! # Build the release profile from scratch
//! cbuild build -p release -a
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `cbuild.toml` parsing and profile layering
//! - [`source`] - source discovery and object naming
//! - [`fingerprint`] - content digests and the persisted store
//! - [`resolver`] - include closure discovery via the preprocessor
//! - [`detect`] - stale/fresh classification
//! - [`build`] - compile and link scheduling
//! - [`export`] - Makefile generation

/// Compile/link scheduling, jobs, scripts and cleanup.
pub mod build;

/// `compile_commands.json` generation.
pub mod compdb;

/// Configuration file parsing (`cbuild.toml`).
pub mod config;

/// Change detection over include closures.
pub mod detect;

/// Makefile export.
pub mod export;

/// File digests and the per-profile fingerprint store.
pub mod fingerprint;

/// Live terminal progress.
pub mod progress;

/// End-of-phase job reports.
pub mod report;

/// Include resolution through the toolchain preprocessor.
pub mod resolver;

/// Source discovery.
pub mod source;

/// Starter configuration template.
pub mod templates;
