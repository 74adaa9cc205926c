pub mod realtime;
pub mod server;

pub use realtime::BroadcastRealtime;
pub use server::GatewayServer;
