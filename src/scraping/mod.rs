pub mod client;
pub mod digikala;
pub mod fetcher;
pub mod marketplace;
pub mod orchestrator;
pub mod proxy;
