pub mod aggregator;
pub mod config;
pub mod keymap;
pub mod listener;
pub mod pairing;
pub mod sessions;
pub mod single_instance;
pub mod store;
pub mod sweeper;
