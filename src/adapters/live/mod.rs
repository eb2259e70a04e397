//! Live adapters for real external interactions.

pub mod tool;
pub mod webdriver;
