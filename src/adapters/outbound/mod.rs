/// Outbound adapters - Infrastructure implementations of outbound ports
pub mod clock;
pub mod console;
pub mod filesystem;
pub mod network;
pub mod sandbox;
pub mod storage;

pub use clock::SystemClock;
