pub mod collector;
pub mod config;
pub mod instrument;
pub mod scheduler;
pub mod signals;
pub mod state;
pub mod strategy;
pub mod venue;
