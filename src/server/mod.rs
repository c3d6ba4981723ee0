mod extract;
mod handlers;
mod models;
mod state;
mod util;

pub use handlers::run_server;
