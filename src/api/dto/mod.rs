//! Data Transfer Objects for control endpoint responses.

pub mod service_dto;

pub use service_dto::*;
