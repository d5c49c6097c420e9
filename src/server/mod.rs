// Server module entry point
// Listener setup, connection handling, the accept loop and shutdown signals

pub mod connection;
pub mod listener;
pub mod signal;
pub mod stream;

// `loop` is a keyword, so the module is mounted under another name
#[path = "loop.rs"]
pub mod serve_loop;

pub use listener::bind_listener;
pub use serve_loop::run;
pub use signal::shutdown_signal;
