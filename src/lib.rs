
//! Read and write Photoshop documents (`.psd` and `.psb`).
//!
//! `file::PsdFile` is the byte-exact structure of a file, with decompressed channels.
//! `document::Document` is the layer tree with every layer decoded to RGBA pixels.
//!
//! ```no_run
//! use psdfile::prelude::*;
//!
//! let document = Document::read_from_file("poster.psd", &ReadOptions::default()).unwrap();
//!
//! for id in document.depth_first() {
//!     let node = document.node(id);
//!     println!("{} at {:?}", node.attributes.name, node.attributes.rect);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    clippy::all,
)]


pub mod io;
pub mod math;
pub mod error;
pub mod context;
pub mod parallel;
pub mod compression;
pub mod meta;
pub mod file;
pub mod image;
pub mod document;


pub mod prelude {
    // main exports
    pub use crate::document::{Document, Node, NodeId, NodeKind, Attributes, LinkedRoot};
    pub use crate::file::{PsdFile, ReadOptions, WriteOptions};

    // core data types
    pub use crate::file::layer::{Layer, Channel};
    pub use crate::image::{Pixel, RgbaImage};
    pub use crate::math::{Vec2, Rect, FloatRect};
    pub use crate::compression::Compression;
    pub use crate::meta::{Header, Version, BitDepth, ColorMode};

    // secondary data types
    pub use crate::meta;
    pub use crate::error;
    pub use crate::error::{Error, Result};
}
