pub mod password;
pub mod permissions;
pub mod session;

pub use password::*;
pub use permissions::*;
pub use session::*;
