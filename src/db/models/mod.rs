//! Database models, one module per table, with their queries as associated functions.

pub mod reservation;
pub mod restriction;
pub mod room;
pub mod todo;
pub mod user;

pub use reservation::*;
pub use restriction::*;
pub use room::*;
pub use todo::*;
pub use user::*;
