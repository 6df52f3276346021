//! Terminal presentation layer

pub mod highlight;
pub mod markdown;

pub use markdown::{print_markdown, MarkdownStreamer};
