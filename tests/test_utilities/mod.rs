pub mod fixtures;
pub mod mocks;
