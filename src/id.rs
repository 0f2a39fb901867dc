//! Identifier generation.

/// Source of fresh, DNS-safe identifiers for sessions and instances.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> String;
}

/// Generates random v4 UUIDs in their 32-character lowercase hex form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}
