pub mod aggregate;
pub mod answer;
pub mod assistant;
pub mod clock;
pub mod config;
pub mod error;
pub mod output;
pub mod provider;
pub mod resolver;
