//! Gateway server implementation

pub mod proxy;
mod router;
pub mod routes;
mod server;

pub use router::{AppState, create_router};
pub use routes::{Route, RouteTable};
pub use server::Gateway;
