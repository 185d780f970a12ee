//! Generate a chat-model response and score it with pluggable evaluators.
//!
//! A [`runner::Runner`] drives each configured scenario: the
//! [`producer::ResponseProducer`] obtains one completion, a
//! [`evaluator::CompositeEvaluator`] scores it, and every metric is gated
//! against the scenario threshold. Outcomes can be persisted with a
//! [`report::ReportStore`].

pub mod client;
pub mod config;
pub mod evaluator;
pub mod judge;
pub mod keyword;
pub mod models;
pub mod output;
pub mod producer;
pub mod report;
pub mod runner;
