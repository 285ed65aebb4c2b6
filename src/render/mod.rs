//! Document rendering: turns a profile and an engagement into the
//! Terms & Conditions document and its PDF bytes.

pub mod pdf;
pub mod terms;

pub use terms::{render, standard_terms, Section, TermsDocument};
