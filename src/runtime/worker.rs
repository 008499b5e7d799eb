//! Fixed pool of worker threads draining the connection queue.
//!
//! Each worker cycles idle → dequeued → servicing → closing → idle. It parks
//! on the queue while idle, services exactly one connection at a time, and
//! always closes the connection before looking for the next. Shutdown is
//! checked before every dequeue, so a worker never abandons a connection it
//! has started on.

use crate::runtime::{Connection, ConnectionQueue, Service, Shutdown, Stats};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// Everything a worker shares with its siblings.
#[derive(Clone)]
struct WorkerContext {
    queue: Arc<ConnectionQueue<Connection>>,
    shutdown: Arc<Shutdown>,
    service: Arc<Service>,
    stats: Arc<Stats>,
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` named worker threads.
    ///
    /// If a spawn fails the queue is closed, the workers already started are
    /// joined, and the error is returned.
    pub fn spawn(
        count: usize,
        queue: Arc<ConnectionQueue<Connection>>,
        shutdown: Arc<Shutdown>,
        service: Arc<Service>,
        stats: Arc<Stats>,
    ) -> io::Result<Self> {
        let ctx = WorkerContext {
            queue,
            shutdown,
            service,
            stats,
        };
        let mut pool = WorkerPool {
            handles: Vec::with_capacity(count),
        };

        for worker_id in 0..count {
            let worker_ctx = ctx.clone();
            let spawned = thread::Builder::new()
                .name(format!("worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, worker_ctx));

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    error!(worker = worker_id, error = %e, "Failed to spawn worker");
                    ctx.queue.close();
                    pool.join();
                    return Err(e);
                }
            }
        }

        Ok(pool)
    }

    /// Wait for every worker to exit. Returns how many of them panicked.
    ///
    /// Workers only exit once shutdown has been requested and the queue has
    /// been closed.
    pub fn join(self) -> usize {
        let mut panicked = 0;
        for (worker_id, handle) in self.handles.into_iter().enumerate() {
            if handle.join().is_err() {
                error!(worker = worker_id, "Worker panicked");
                panicked += 1;
            }
        }
        panicked
    }
}

fn worker_loop(worker_id: usize, ctx: WorkerContext) {
    debug!(worker = worker_id, "Worker started");

    while !ctx.shutdown.is_requested() {
        let Some(mut conn) = ctx.queue.pop_wait() else {
            break;
        };

        ctx.stats.begin_service();
        let peer = conn.peer();
        let result = conn.serve(&ctx.service);
        conn.close();

        match result {
            Ok(bytes) => {
                debug!(worker = worker_id, peer = %peer, bytes, "Reply sent");
                ctx.stats.end_service(true);
            }
            Err(e) => {
                warn!(worker = worker_id, peer = %peer, error = %e, "Connection abandoned");
                ctx.stats.end_service(false);
            }
        }
    }

    debug!(worker = worker_id, "Worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Multiplier;
    use mio::{Poll, Token, Waker};
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    struct Fixture {
        queue: Arc<ConnectionQueue<Connection>>,
        shutdown: Arc<Shutdown>,
        stats: Arc<Stats>,
        listener: TcpListener,
        _poll: Poll,
    }

    impl Fixture {
        fn new(capacity: usize) -> Self {
            let poll = Poll::new().unwrap();
            let waker = Waker::new(poll.registry(), Token(0)).unwrap();
            Self {
                queue: Arc::new(ConnectionQueue::new(capacity)),
                shutdown: Arc::new(Shutdown::new(waker)),
                stats: Arc::new(Stats::new()),
                listener: TcpListener::bind("127.0.0.1:0").unwrap(),
                _poll: poll,
            }
        }

        fn spawn(&self, count: usize) -> WorkerPool {
            WorkerPool::spawn(
                count,
                Arc::clone(&self.queue),
                Arc::clone(&self.shutdown),
                Arc::new(Service::new(
                    Multiplier::new(10),
                    256,
                    Some(Duration::from_secs(5)),
                )),
                Arc::clone(&self.stats),
            )
            .unwrap()
        }

        /// Connect a client and queue the server side of it.
        fn enqueue_client(&self) -> TcpStream {
            let client = TcpStream::connect(self.listener.local_addr().unwrap()).unwrap();
            client
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let (stream, peer) = self.listener.accept().unwrap();
            assert!(self.queue.try_push(Connection::new(stream, peer)).is_ok());
            client
        }

        fn stop(&self, pool: WorkerPool) -> usize {
            self.shutdown.request();
            self.queue.close();
            pool.join()
        }
    }

    fn exchange(mut client: TcpStream, request: &[u8]) -> Vec<u8> {
        client.write_all(request).unwrap();
        let mut reply = Vec::new();
        client.read_to_end(&mut reply).unwrap();
        reply
    }

    #[test]
    fn test_workers_service_queued_connections() {
        let fixture = Fixture::new(8);
        let pool = fixture.spawn(2);

        let clients: Vec<_> = (0..4).map(|_| fixture.enqueue_client()).collect();
        let replies: Vec<_> = clients
            .into_iter()
            .enumerate()
            .map(|(i, c)| exchange(c, i.to_string().as_bytes()))
            .collect();

        assert_eq!(replies, vec![b"0".to_vec(), b"10".to_vec(), b"20".to_vec(), b"30".to_vec()]);
        assert_eq!(fixture.stop(pool), 0);

        let stats = fixture.stats.snapshot();
        assert_eq!(stats.served, 4);
        assert_eq!(stats.in_service, 0);
    }

    #[test]
    fn test_failed_exchange_does_not_stop_worker() {
        let fixture = Fixture::new(4);
        let pool = fixture.spawn(1);

        let bad = fixture.enqueue_client();
        assert!(exchange(bad, b"not a number").is_empty());

        let good = fixture.enqueue_client();
        assert_eq!(exchange(good, b"9"), b"90");

        assert_eq!(fixture.stop(pool), 0);
        let stats = fixture.stats.snapshot();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.served, 1);
    }

    #[test]
    fn test_idle_workers_exit_on_close() {
        let fixture = Fixture::new(1);
        let pool = fixture.spawn(3);
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(fixture.stop(pool), 0);
        assert_eq!(fixture.stats.snapshot().served, 0);
    }

    #[test]
    fn test_worker_finishes_in_flight_connection() {
        let fixture = Fixture::new(2);
        let pool = fixture.spawn(1);

        let client = fixture.enqueue_client();
        while fixture.stats.snapshot().in_service == 0 {
            std::thread::sleep(Duration::from_millis(5));
        }

        fixture.shutdown.request();
        fixture.queue.close();
        assert_eq!(exchange(client, b"4"), b"40");
        assert_eq!(pool.join(), 0);
        assert_eq!(fixture.stats.snapshot().served, 1);
    }
}
