// handlers/public/mod.rs - Public handlers (no tenant context)

pub mod health; // GET /health
pub mod root; // GET /

pub use health::health;
pub use root::root;
