// Building blocks shared by the image engine: packed timestamps and 8.3 names

pub mod names;
pub mod timestamps;

pub use names::{decode_name, encode_name, GLYPH_SUBSTITUTIONS};
pub use timestamps::*;
