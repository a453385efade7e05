// ABOUTME: Wire protocol for the live detection channel
// ABOUTME: JSON envelope with a type discriminant and typed event payloads

/// Message envelope and event type definitions
pub mod messages;

pub use messages::{Envelope, Event};
