/// Application layer - Use cases, parsers and DTOs
///
/// This layer contains the application logic that orchestrates
/// domain services and coordinates with infrastructure through ports.
pub mod dto;
pub mod parsers;
pub mod use_cases;
