pub mod auction;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod ids;
pub mod league;
pub mod ledger;
pub mod matches;
pub mod models;
pub mod reset;
pub mod roster;
pub mod scoring;
pub mod seed;
pub mod standings;

pub use error::{CoreError, CoreResult, ErrorKind};
pub use league::{League, TickReport};
