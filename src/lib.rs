//! Real-time fraud-scoring pipeline: a two-stage streaming system (raw log → stream
//! adapter → processing log → worker pool) backed by a property graph that the
//! feature extractors, risk fusion engine, and periodic analytics batch all read from
//! and write to. See `SPEC_FULL.md` for the full module/operation catalogue and
//! `DESIGN.md` for how each piece is grounded in the source this was built from.

pub mod adapter;
pub mod alerts;
pub mod asn;
pub mod batch;
pub mod collusive;
pub mod config;
pub mod error;
pub mod features;
pub mod graph;
pub mod models;
pub mod risk;
pub mod stream;
pub mod worker;
