pub mod batch;
pub mod client;
pub mod scheduler;

pub use batch::DeviceBatch;
pub use client::{Delivery, HttpDeliveryClient};
pub use scheduler::BatchScheduler;
