//! EFV Metadata Model
//!
//! Defines the data contracts exchanged between the extension session and
//! the capture stack:
//! - **Keys:** The request and result key vocabulary
//! - **Values:** Typed metadata values and the ordered key/value containers
//! - **Geometry:** Sizes, rectangles, points, and image formats
//! - **Capabilities:** The vendor-published request and result key sets

pub mod capabilities;
pub mod geometry;
pub mod keys;
pub mod value;

pub use capabilities::*;
pub use geometry::*;
pub use keys::*;
pub use value::*;
