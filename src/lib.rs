// Modules
pub mod config;
pub mod consts;
pub mod docs;
pub mod evolution;
pub mod handlers;
pub mod island;
pub mod portfolio;
pub mod statistics;
pub mod web_app;

pub use evolution::{EvolutionConfig, EvolutionError};
pub use island::{Island, IslandStatus};
pub use portfolio::PortfolioModel;
