pub mod ping; // GET /api/tenant/ping

pub use ping::tenant_ping;
