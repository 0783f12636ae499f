pub mod commands;
pub mod progress;
pub mod util;

pub use progress::ConsoleRenderer;
pub use util::CommandContext;
