pub mod hooks;
pub mod memory;
pub mod model;
pub mod repo;
pub mod services;

pub use model::{NewUser, SaveOptions, User, UserRole};
pub use repo::{PgUserStore, UserStore};
