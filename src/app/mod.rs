//! Request handling: content resolution, per-request routing and the server
//! lifecycle that ties them to a transport.

pub mod resolver;
pub mod router;
pub mod server;

pub use resolver::{ContentResolver, ResolvedTarget};
pub use router::RequestRouter;
pub use server::{launch_url, PreviewServer, RunError, RunOutcome, ServerState};
