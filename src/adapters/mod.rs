//! Infrastructure adapters. Implement outbound ports.
//!
//! SQLite and in-memory stores. Map errors to DomainError.

pub mod persistence;
