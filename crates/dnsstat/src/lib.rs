mod app;
pub use app::App;
mod cli;
pub use cli::Args;
mod logging;
pub use logging::setup_logging;
pub mod frame;
pub mod report;
pub mod trace;
