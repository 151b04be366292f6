// handlers/elevated/mod.rs - Administrative handlers
//
// Tenant registration and database lifecycle. These routes span every
// tenant and are expected to sit behind operator-only access at the edge.

pub mod tenant;

pub use tenant::*;
