//! TSL UMD tally protocol.
//!
//! The sender speaks a simplified form of TSL UMD v3.1: one fixed-size
//! binary message per source per tick, no batching, no sequence numbers
//! and no checksum. See [`umd`] for the byte layout.
//!
//! ## Tally slots
//!
//! | Slot | Bit | Common meaning |
//! |------|-----|----------------|
//! | 1 | `0x01` | Preview |
//! | 2 | `0x02` | Program |
//! | 3 | `0x04` | Auxiliary tally 3 |
//! | 4 | `0x08` | Auxiliary tally 4 |

pub mod umd;

pub use umd::{LABEL_LEN, MESSAGE_LEN, Message, TallySlot, TallyState};
