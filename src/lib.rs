//! A cooperative, budgeted scheduler for resolved command chains.
#![cfg_attr(all(docsrs, not(doctest)), feature(doc_auto_cfg))]

pub use cadence_core::*;
