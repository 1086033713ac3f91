pub mod config;
pub mod pose;
pub mod tracker;
