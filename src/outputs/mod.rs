//! Where processed articles end up.
//!
//! # Submodules
//!
//! - [`archive`]: the raw and clean CSV archives (append, purge, tail reads)
//! - [`sink`]: optional fire-and-forget delivery to an external consumer
//!
//! # Output Structure
//!
//! ```text
//! news_native.csv   # raw: original titles, theme and location codes
//! news.csv          # clean: translated titles, readable themes and locations
//! ```
//!
//! Both files share the column layout in [`archive::COLUMNS`].

pub mod archive;
pub mod sink;
