//! Manifest canonicalization and validation.
//!
//! The normalizer migrates legacy and v0 manifest shapes into the current
//! canonical contract; the validator enforces structural and cross-reference
//! integrity against that contract with feature gates keyed on
//! `manifest_version`. Normalization never fails; validation decides
//! legality.

pub mod catalog;
mod normalize;
mod validate;

#[cfg(test)]
mod tests;

pub use normalize::normalize_manifest;
pub use validate::{validate_manifest, validate_manifest_raw};
