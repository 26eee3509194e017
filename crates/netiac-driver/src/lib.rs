pub mod driver;
pub mod error;
pub mod mock;

pub use driver::{ApplianceDriver, CreateResult, DriverObject};
pub use error::DriverError;
pub use mock::MockDriver;
