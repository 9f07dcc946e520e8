pub mod connection;
pub mod lifecycle;
pub mod state;

pub use connection::ConnectionManager;
pub use lifecycle::{Lifecycle, LinkAction, LinkEvent};
pub use state::ConnectionState;
