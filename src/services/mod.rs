pub mod catalog;
pub mod checker;
pub mod exporter;
pub mod fetcher;
pub mod flight;
pub mod m3u_parser;
pub mod metrics;
pub mod prober;
pub mod repair;
pub mod scheduler;
pub mod store;
pub mod subscriptions;
