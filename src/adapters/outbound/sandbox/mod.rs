/// Sandbox adapters for submitting scan jobs
mod http_sandbox;

pub use http_sandbox::HttpJobSandbox;
