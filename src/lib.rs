#![warn(
    clippy::pedantic,
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    rust_2021_compatibility
)]
#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

//! `termlattice` is a whole-program, bounded-termination analysis over a
//! compiler's intermediate representation. It answers, for each function
//! and for the program as a whole, one of four questions: does it
//! provably terminate in a statically bounded number of steps
//! ([`lattice::Verdict::Bounded`]), does it provably diverge
//! ([`lattice::Verdict::Unbounded`]), or can neither be established
//! ([`lattice::Verdict::Unknown`])?
//!
//! The crate does not parse or transform any particular compiler's IR
//! itself — it consumes the views in [`ir`] (function CFG, loop info,
//! scalar evolution, call graph) that a host analysis would already have
//! on hand, runs [`function::FunctionAnalyzer`] per function and then
//! [`module::ModuleAnalyzer`] across the call graph, and hands the results
//! to [`printer`] for human-readable output.
//!
//! ## Features
#![doc = document_features::document_features!()]

pub mod function;
pub mod ir;
pub mod lattice;
pub mod module;
pub mod printer;
