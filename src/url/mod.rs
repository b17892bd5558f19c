//! Website-string normalization and domain validation
//!
//! Input records carry whatever their source spreadsheet happened to hold in
//! the website column: bare hosts, full URLs, tracking-parameter soup, or
//! junk. This module turns that into a validated [`Domain`] or nothing.

mod domain;

pub use domain::{clean_website, Domain};
