//! Candidate selection and pruning utilities.
//!
//! Includes Top-K peak collection, normalized boxes and cross-seal
//! non-maximum suppression.

pub mod bbox;
pub mod nms;
pub(crate) mod topk;
