//! Format implementations
//!
//! This module contains all format implementations that convert between
//! the document tree and various text representations.

pub mod html;
pub mod icons;
pub mod json;
pub mod markdown;
pub mod treeviz;

pub use html::{HtmlFormat, HtmlOptions};
pub use json::JsonFormat;
pub use markdown::MarkdownFormat;
pub use treeviz::TreevizFormat;
