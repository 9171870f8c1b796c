//! Documents the server generates or rewrites: bundled assets, rendered
//! Markdown and console instrumentation for HTML.

pub mod assets;
pub mod instrument;
pub mod markdown;
