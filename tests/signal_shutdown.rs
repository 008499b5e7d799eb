//! SIGINT stops the server binary cleanly.

use mult_server::client::{self, ClientError};
use std::net::{SocketAddr, TcpListener};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Kills the child if the test fails before it exits.
struct ServerProcess(Child);

impl ServerProcess {
    fn spawn(port: u16) -> Self {
        let child = Command::new(env!("CARGO_BIN_EXE_mult-server"))
            .args(["--host", "127.0.0.1", "-p", &port.to_string(), "-w", "2", "-q", "4"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        ServerProcess(child)
    }

    fn signal(&self, sig: libc::c_int) {
        // SAFETY: plain kill(2) on our own child.
        assert_eq!(unsafe { libc::kill(self.0.id() as libc::pid_t, sig) }, 0);
    }

    fn wait(&mut self) -> ExitStatus {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            if let Some(status) = self.0.try_wait().unwrap() {
                return status;
            }
            assert!(Instant::now() < deadline, "server did not exit");
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Workers are spawned after the signal thread, so a served request means
/// signal handling is in place.
fn wait_until_serving(addr: SocketAddr) {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        match client::request(addr, "7", Some(TIMEOUT)) {
            Ok(result) => {
                assert_eq!(result, 70);
                return;
            }
            Err(ClientError::Connect(_)) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("server never came up: {e}"),
        }
    }
}

#[test]
fn test_sigint_shuts_down() {
    let port = free_port();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let mut server = ServerProcess::spawn(port);
    wait_until_serving(addr);

    server.signal(libc::SIGINT);
    // A second signal during shutdown is ignored.
    server.signal(libc::SIGINT);

    let status = server.wait();
    assert!(status.success(), "exit status {status:?}");
    assert!(matches!(
        client::request(addr, "7", Some(Duration::from_secs(1))),
        Err(ClientError::Connect(_))
    ));
}

#[test]
fn test_sigterm_shuts_down() {
    let port = free_port();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let mut server = ServerProcess::spawn(port);
    wait_until_serving(addr);

    server.signal(libc::SIGTERM);
    assert!(server.wait().success());
}
