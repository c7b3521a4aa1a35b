pub mod dispatcher;
pub mod filter;

pub use dispatcher::Dispatcher;
pub use filter::{MeasurementFilter, Policy};
