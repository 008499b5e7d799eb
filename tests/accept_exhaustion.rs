//! Accepting resumes after the process runs out of descriptors.
//!
//! Lowers `RLIMIT_NOFILE` for the whole process, so it lives in its own test
//! binary.

#![cfg(target_os = "linux")]

use mult_server::{Config, Server};
use socket2::{Domain, Protocol, Socket, Type};
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        workers: 2,
        max_connections: 4,
        backlog: 128,
        io_timeout_ms: 10_000,
        multiplier: 10,
        max_message_size: 256,
        log_level: "info".to_string(),
    }
}

fn open_fds() -> u64 {
    std::fs::read_dir("/proc/self/fd").unwrap().count() as u64
}

/// Restores the original descriptor limit when dropped.
struct FdLimit(libc::rlimit);

impl FdLimit {
    fn lower_to(soft: u64) -> Self {
        let mut original = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: valid out pointer for getrlimit.
        assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut original) }, 0);

        let lowered = libc::rlimit {
            rlim_cur: (soft as libc::rlim_t).min(original.rlim_cur),
            rlim_max: original.rlim_max,
        };
        // SAFETY: valid rlimit struct; the hard limit is unchanged.
        assert_eq!(unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &lowered) }, 0);
        FdLimit(original)
    }
}

impl Drop for FdLimit {
    fn drop(&mut self) {
        // SAFETY: restoring the limit read in `lower_to`.
        unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &self.0) };
    }
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_accept_resumes_after_descriptor_exhaustion() {
    let server = Server::bind(test_config()).unwrap();
    let addr = server.local_addr();
    let handle = server.handle();
    let running = thread::spawn(move || server.run());

    // Client sockets are created up front; connecting them needs no new
    // descriptor in this process.
    let clients: Vec<_> = (0..3)
        .map(|_| Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).unwrap())
        .collect();

    let limit = FdLimit::lower_to(open_fds() + 32);
    let mut fillers = Vec::new();
    loop {
        match File::open("/dev/null") {
            Ok(file) => fillers.push(file),
            Err(e) if e.raw_os_error() == Some(libc::EMFILE) => break,
            Err(e) => panic!("unexpected open failure: {e}"),
        }
    }

    for client in &clients {
        client.connect(&addr.into()).unwrap();
    }
    thread::sleep(Duration::from_millis(300));
    assert_eq!(handle.stats().accepted, 0);

    // No new connection arrives to re-arm readiness; the acceptor has to
    // come back on its own.
    drop(fillers);
    wait_until("backlog accepted", || handle.stats().accepted == 3);
    drop(limit);

    let replies: Vec<_> = clients
        .into_iter()
        .enumerate()
        .map(|(i, socket)| -> io::Result<String> {
            let mut stream = TcpStream::from(socket);
            stream.set_read_timeout(Some(Duration::from_secs(5)))?;
            stream.write_all((i + 1).to_string().as_bytes())?;
            let mut reply = String::new();
            stream.read_to_string(&mut reply)?;
            Ok(reply)
        })
        .collect::<io::Result<_>>()
        .unwrap();
    assert_eq!(replies, ["10", "20", "30"]);

    handle.shutdown();
    let stats = running.join().unwrap().unwrap();
    assert_eq!(stats.accepted, 3);
    assert_eq!(stats.rejected, 0);
    assert_eq!(stats.served, 3);
}
