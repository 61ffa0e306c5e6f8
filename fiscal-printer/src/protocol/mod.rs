//! Wire protocol: frame codec, sequence numbers and status decoding

pub mod frame;
pub mod sequence;
pub mod status;

pub use frame::{Frame, decode, encode};
pub use sequence::SequenceCounter;
pub use status::{Clean, StatusTable, Warning};
