pub mod clients;
pub mod dispatch;
pub mod documents;
pub mod driver_actions;
pub mod drivers;
pub mod events;
pub mod invoicing;
pub mod messaging;
pub mod notifier;
pub mod orders;
pub mod pricing;
pub mod ranking;
pub mod references;
pub mod stats;
