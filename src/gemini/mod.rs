pub mod client;
pub mod extract;
pub mod types;
