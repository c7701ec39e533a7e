pub mod engine;
pub mod lot;
pub mod timer;

pub use engine::BidReceipt;
pub use lot::{AuctionView, FinalizeOutcome, LotView};
