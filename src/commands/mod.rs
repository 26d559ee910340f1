mod clean;
mod migrations;
mod reset;
mod serve;

pub use clean::run_clean;
pub use migrations::run_migrations_ls;
pub use reset::run_reset;
pub use serve::run_serve;
