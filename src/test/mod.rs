pub mod utils;

mod auth;
mod users;
