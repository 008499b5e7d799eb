//! Termination signal handling.
//!
//! SIGINT and SIGTERM are blocked in the calling thread, and therefore in
//! every thread spawned from it afterwards, then received synchronously by a
//! dedicated thread through `sigwait`. Nothing runs in async-signal context:
//! the listener thread simply forwards each signal to `Shutdown::request`.

use crate::runtime::Shutdown;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

fn termination_set() -> io::Result<libc::sigset_t> {
    // SAFETY: sigset_t is plain data, initialized by sigemptyset before use.
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        if libc::sigemptyset(&mut set) != 0
            || libc::sigaddset(&mut set, libc::SIGINT) != 0
            || libc::sigaddset(&mut set, libc::SIGTERM) != 0
        {
            return Err(io::Error::last_os_error());
        }
        Ok(set)
    }
}

fn signal_name(sig: libc::c_int) -> &'static str {
    match sig {
        libc::SIGINT => "SIGINT",
        libc::SIGTERM => "SIGTERM",
        _ => "unknown",
    }
}

/// Block termination signals and start the thread that turns them into a
/// shutdown request.
///
/// Must be called before any other thread is spawned, otherwise those
/// threads keep the default disposition and a signal may kill the process.
pub fn spawn_listener(shutdown: Arc<Shutdown>) -> io::Result<JoinHandle<()>> {
    let set = termination_set()?;

    // SAFETY: `set` is a valid, initialized signal set.
    let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }

    thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || loop {
            let mut sig: libc::c_int = 0;
            // SAFETY: `set` outlives the call and `sig` is a valid out pointer.
            let rc = unsafe { libc::sigwait(&set, &mut sig) };
            if rc != 0 {
                error!(error = %io::Error::from_raw_os_error(rc), "sigwait failed");
                return;
            }

            if shutdown.request() {
                info!(signal = signal_name(sig), "Termination signal received");
            } else {
                info!(signal = signal_name(sig), "Shutdown already in progress");
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_set() {
        let set = termination_set().unwrap();
        // SAFETY: querying membership of an initialized set.
        unsafe {
            assert_eq!(libc::sigismember(&set, libc::SIGINT), 1);
            assert_eq!(libc::sigismember(&set, libc::SIGTERM), 1);
            assert_eq!(libc::sigismember(&set, libc::SIGHUP), 0);
        }
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(signal_name(libc::SIGINT), "SIGINT");
        assert_eq!(signal_name(libc::SIGTERM), "SIGTERM");
        assert_eq!(signal_name(libc::SIGUSR1), "unknown");
    }
}
