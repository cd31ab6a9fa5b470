//! CLI command implementations.

pub mod auto;
pub mod clear_queue;
pub mod dead_letters;
pub mod logs;
pub mod stats;
pub mod sync;
pub mod test_connection;
pub mod watch;
