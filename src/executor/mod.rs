pub mod driver;
pub mod session;

pub use driver::{Driver, PreparedStatement};
pub use session::{Session, SqlMapClient};
