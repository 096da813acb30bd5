pub mod erc20;
pub mod factory;
pub mod token_manager;

pub use erc20::{Transfer, IERC20};
pub use factory::{IArenaFactory, PairCreated};
pub use token_manager::{TokenCreated, TokenParameters};
