/*!
 * Script Threads
 * Dedicated OS threads for evaluating app code away from the async runtime
 *
 * The interpreter recurses on the native stack, so these threads get far
 * more of it than a runtime worker has.
 */

use std::io;
use std::thread::{self, JoinHandle};

/// Native stack reserved for each script thread
pub const SCRIPT_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Run `work` on a named thread with a script-sized stack
pub fn spawn_isolated<F>(name: impl Into<String>, work: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .stack_size(SCRIPT_STACK_SIZE)
        .spawn(work)
}
