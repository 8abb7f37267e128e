//! Core types and the Westgard multi-rule evaluation engine for qclab.
//!
//! This crate has no HTTP or database dependencies.
//! Evaluation is a pure computation over caller-supplied values; the only
//! side-effecting piece is [`workflow`], which drives a
//! [`store::QualityStore`] implementation.

// Store methods spell out `+ Send` on their returned futures.
#![allow(async_fn_in_trait)]

pub mod catalog;
pub mod error;
pub mod evaluate;
pub mod limits;
pub mod measurement;
pub mod rule;
pub mod store;
pub mod violation;
pub mod workflow;

pub use error::{Error, Result};
pub use evaluate::{Evaluation, EvaluationResult, Level, evaluate, evaluate_series};
pub use limits::{ControlContext, ControlLimits, z_score};
pub use rule::{ControlRule, RuleConfig, RuleFamily, Severity};
