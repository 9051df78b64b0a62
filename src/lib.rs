pub mod events;
pub mod rules;
pub mod shared;
pub mod state;
pub mod table;

pub use events::*;
pub use shared::*;
pub use state::Hand;
pub use table::{Seat, Table};
