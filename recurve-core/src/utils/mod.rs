pub mod encoding;
pub mod testing;

pub use encoding::{one_hot, one_hot_seq};
