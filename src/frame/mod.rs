pub mod classifier;
pub mod decoder;

pub use classifier::{classify, classify_text, Encoding};
pub use decoder::{decode_binary, decode_hex_text, decode_json_text, decode_text, decode_unit, FRAME_LEN};
