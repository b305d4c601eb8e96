//! Collective operations between cooperating workers.
//!
//! Every participant must call the same collectives in the same order. Collectives are blocking
//! on both ends: a sender waits until its peer takes the packet and a receiver waits for its peer,
//! with no timeout, so a stalled participant stalls the whole run.
//! A peer that goes away (its communicator dropped) surfaces as a transport failure instead.

use std::sync::mpsc;

use crate::foundation::error::{GrayfadeError, GrayfadeResult};

/// Which collective a packet belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collective {
    Broadcast,
    Gather,
}

#[derive(Debug)]
struct Packet {
    op: Collective,
    seq: u64,
    payload: Vec<u8>,
}

/// Rank-addressed collective transport.
pub trait Communicator {
    /// This participant's rank in `[0, size)`.
    fn rank(&self) -> usize;

    /// Number of participants.
    fn size(&self) -> usize;

    /// Replace `buf` on every non-root rank with the root's `buf`, byte for byte.
    fn broadcast(&mut self, root: usize, buf: &mut Vec<u8>) -> GrayfadeResult<()>;

    /// Collect one contribution per rank at `root`.
    ///
    /// The root receives `Some(contributions)` indexed by rank, its own included; contributions
    /// are ordered by rank regardless of arrival order. Other ranks receive `None`.
    fn gather(&mut self, root: usize, contribution: Vec<u8>)
    -> GrayfadeResult<Option<Vec<Vec<u8>>>>;

    /// Nobody leaves until everybody has arrived.
    fn barrier(&mut self) -> GrayfadeResult<()> {
        self.gather(0, Vec::new())?;
        let mut token = Vec::new();
        self.broadcast(0, &mut token)
    }
}

/// Builds a set of connected in-process communicators, one per worker thread.
pub struct LocalCluster;

impl LocalCluster {
    /// `size` communicators; element `k` has rank `k`.
    ///
    /// Each ordered pair of ranks gets its own rendezvous channel. That keeps per-source FIFO
    /// order, lets a gather read contributions strictly by rank, and holds a sender until the
    /// receiver has arrived, so no rank runs ahead of the collective it is part of.
    pub fn new(size: usize) -> GrayfadeResult<Vec<ThreadComm>> {
        if size == 0 {
            return Err(GrayfadeError::configuration("worker count must be >= 1"));
        }

        let mut to: Vec<Vec<Option<mpsc::SyncSender<Packet>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut from: Vec<Vec<Option<mpsc::Receiver<Packet>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

        for src in 0..size {
            for dst in 0..size {
                if src == dst {
                    continue;
                }
                let (tx, rx) = mpsc::sync_channel(0);
                to[src][dst] = Some(tx);
                from[dst][src] = Some(rx);
            }
        }

        Ok(to
            .into_iter()
            .zip(from)
            .enumerate()
            .map(|(rank, (to, from))| ThreadComm {
                rank,
                size,
                to,
                from,
                seq: 0,
            })
            .collect())
    }
}

/// Channel-backed communicator for one worker thread.
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    to: Vec<Option<mpsc::SyncSender<Packet>>>,
    from: Vec<Option<mpsc::Receiver<Packet>>>,
    seq: u64,
}

impl ThreadComm {
    fn check_root(&self, root: usize, op: Collective) -> GrayfadeResult<()> {
        if root >= self.size {
            return Err(GrayfadeError::transport(format!(
                "{op:?} root {root} out of range for {} ranks",
                self.size
            )));
        }
        Ok(())
    }

    fn send(&self, dst: usize, op: Collective, seq: u64, payload: Vec<u8>) -> GrayfadeResult<()> {
        let tx = self.to[dst].as_ref().ok_or_else(|| {
            GrayfadeError::transport(format!("rank {} has no channel to {dst}", self.rank))
        })?;
        tx.send(Packet { op, seq, payload }).map_err(|_| {
            GrayfadeError::transport(format!(
                "rank {dst} went away during {op:?} #{seq} from rank {}",
                self.rank
            ))
        })
    }

    fn recv(&self, src: usize, op: Collective, seq: u64) -> GrayfadeResult<Vec<u8>> {
        let rx = self.from[src].as_ref().ok_or_else(|| {
            GrayfadeError::transport(format!("rank {} has no channel from {src}", self.rank))
        })?;
        let packet = rx.recv().map_err(|_| {
            GrayfadeError::transport(format!(
                "rank {src} went away before completing {op:?} #{seq}"
            ))
        })?;
        if packet.op != op || packet.seq != seq {
            return Err(GrayfadeError::transport(format!(
                "rank {} expected {op:?} #{seq} from rank {src}, got {:?} #{}",
                self.rank, packet.op, packet.seq
            )));
        }
        Ok(packet.payload)
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast(&mut self, root: usize, buf: &mut Vec<u8>) -> GrayfadeResult<()> {
        self.check_root(root, Collective::Broadcast)?;
        let seq = self.next_seq();
        if self.rank == root {
            for dst in (0..self.size).filter(|&d| d != root) {
                self.send(dst, Collective::Broadcast, seq, buf.clone())?;
            }
        } else {
            *buf = self.recv(root, Collective::Broadcast, seq)?;
        }
        Ok(())
    }

    fn gather(
        &mut self,
        root: usize,
        contribution: Vec<u8>,
    ) -> GrayfadeResult<Option<Vec<Vec<u8>>>> {
        self.check_root(root, Collective::Gather)?;
        let seq = self.next_seq();
        if self.rank != root {
            self.send(root, Collective::Gather, seq, contribution)?;
            return Ok(None);
        }

        let mut own = Some(contribution);
        let mut slots = Vec::with_capacity(self.size);
        for src in 0..self.size {
            if src == root {
                slots.push(own.take().unwrap_or_default());
            } else {
                slots.push(self.recv(src, Collective::Gather, seq)?);
            }
        }
        Ok(Some(slots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn broadcast_delivers_identical_bytes_to_every_rank() {
        let comms = LocalCluster::new(4).unwrap();
        let payload: Vec<u8> = (0..=255).collect();
        let received = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|mut c| {
                    let payload = payload.clone();
                    s.spawn(move || {
                        let mut buf = if c.rank() == 0 { payload } else { Vec::new() };
                        c.broadcast(0, &mut buf).unwrap();
                        buf
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        for buf in received {
            assert_eq!(buf, payload);
        }
    }

    #[test]
    fn gather_orders_by_rank_not_arrival() {
        let n = 4;
        let comms = LocalCluster::new(n).unwrap();
        let gathered = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|mut c| {
                    s.spawn(move || {
                        let r = c.rank();
                        // Higher ranks arrive first.
                        std::thread::sleep(Duration::from_millis(((n - r) * 10) as u64));
                        c.gather(0, vec![r as u8; r + 1]).unwrap()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        let at_root = gathered[0].clone().unwrap();
        assert_eq!(at_root, vec![vec![0], vec![1, 1], vec![2, 2, 2], vec![3, 3, 3, 3]]);
        assert!(gathered[1..].iter().all(Option::is_none));
    }

    #[test]
    fn repeated_gathers_stay_in_step() {
        let comms = LocalCluster::new(3).unwrap();
        let rounds = std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|mut c| {
                    s.spawn(move || {
                        let mut seen = Vec::new();
                        for round in 0..20u8 {
                            if let Some(all) = c.gather(0, vec![round, c.rank() as u8]).unwrap() {
                                seen.push(all);
                            }
                        }
                        seen
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect::<Vec<_>>()
        });
        for (round, all) in rounds[0].iter().enumerate() {
            let round = round as u8;
            assert_eq!(all, &vec![vec![round, 0], vec![round, 1], vec![round, 2]]);
        }
    }

    #[test]
    fn single_rank_collectives_are_local() {
        let mut comms = LocalCluster::new(1).unwrap();
        let c = &mut comms[0];
        let mut buf = vec![1, 2, 3];
        c.broadcast(0, &mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3]);
        assert_eq!(c.gather(0, vec![4]).unwrap(), Some(vec![vec![4]]));
        c.barrier().unwrap();
    }

    #[test]
    fn departed_peer_is_a_transport_failure() {
        let mut comms = LocalCluster::new(2).unwrap();
        let peer = comms.pop().unwrap();
        drop(peer);
        let root = &mut comms[0];
        let err = root.gather(0, vec![1]).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn mismatched_collectives_are_detected() {
        let mut comms = LocalCluster::new(2).unwrap();
        let mut b = comms.pop().unwrap();
        let mut a = comms.pop().unwrap();

        let err = std::thread::scope(|s| {
            let sender = s.spawn(move || {
                let mut buf = vec![7];
                a.broadcast(0, &mut buf)
            });
            let err = b.gather(1, vec![8]).unwrap_err();
            sender.join().unwrap().unwrap();
            err
        });
        assert!(err.is_transport());
        assert!(err.to_string().contains("expected Gather"));
    }

    #[test]
    fn gather_waits_for_the_root() {
        let mut comms = LocalCluster::new(2).unwrap();
        let mut worker = comms.pop().unwrap();
        let mut root = comms.pop().unwrap();
        let sent = AtomicUsize::new(0);

        std::thread::scope(|s| {
            let h = s.spawn(|| {
                for _ in 0..3 {
                    worker.gather(0, vec![0; 4096]).unwrap();
                    sent.fetch_add(1, Ordering::SeqCst);
                }
            });

            std::thread::sleep(Duration::from_millis(100));
            assert_eq!(sent.load(Ordering::SeqCst), 0);

            for _ in 0..3 {
                let all = root.gather(0, vec![1]).unwrap().unwrap();
                assert_eq!(all[1].len(), 4096);
            }
            h.join().unwrap();
        });
        assert_eq!(sent.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn blocked_sender_fails_when_root_goes_away() {
        let mut comms = LocalCluster::new(2).unwrap();
        let mut worker = comms.pop().unwrap();
        let root = comms.pop().unwrap();

        let res = std::thread::scope(|s| {
            let h = s.spawn(move || worker.gather(0, vec![1, 2, 3]));
            std::thread::sleep(Duration::from_millis(50));
            drop(root);
            h.join().unwrap()
        });
        assert!(res.unwrap_err().is_transport());
    }

    #[test]
    fn bad_root_is_rejected() {
        let mut comms = LocalCluster::new(2).unwrap();
        let err = comms[0].gather(2, Vec::new()).unwrap_err();
        assert!(err.is_transport());
        assert!(LocalCluster::new(0).is_err());
    }
}
