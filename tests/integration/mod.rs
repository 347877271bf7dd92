//! Integration test suite for crew.
//!
//! These tests exercise the orchestration engine against real git
//! repositories: workspace isolation, patch transfer, dependency-aware
//! scheduling, and the full plan-execute-verify-review pipeline.
//!
//! # Test Categories
//!
//! - `workspaces`: Referenced-clone creation and isolation
//! - `patches`: Patch export/apply, fallback and rollback behavior
//! - `scheduling`: Readiness, concurrency bound, failure containment
//! - `pipeline`: Full run end-to-end with scripted agents
//!
//! # CI Compatibility
//!
//! Agents are scripted (no API calls); only the `git` binary is required.


mod workspaces;
mod patches;
mod pipeline;
