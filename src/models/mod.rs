pub mod change;
pub mod client;
pub mod driver;
pub mod event;
pub mod invoice;
pub mod message;
pub mod notification;
pub mod order;
