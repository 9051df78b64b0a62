pub mod hub;
pub mod protocol;
pub mod server;
pub mod session;

pub use hub::Hub;
pub use server::{Server, ServerConfig};
pub use session::{Session, SessionManager};
