//! Mutex-guarded unbounded queue bridging the dedicated audio-capture thread
//! into the main loop, woken via a single status byte written to a pipe
//! (SPEC_FULL §5). The producer never waits and the consumer only polls on
//! the pipe's read-readiness, so a plain `Mutex` (no condition variable)
//! is enough.

use std::collections::VecDeque;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Mutex};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd::{pipe, read, write};

/// One item pushed by the audio thread: a captured PCM block plus the
/// producer-side buffering latency to stamp on the resulting packet.
#[derive(Debug, Clone)]
pub struct AudioBlock {
    pub pcm: Vec<u8>,
    pub latency_ms: u16,
}

pub struct AudioQueue {
    items: Mutex<VecDeque<AudioBlock>>,
    wake_read: OwnedFd,
    wake_write: OwnedFd,
}

impl AudioQueue {
    pub fn new() -> std::io::Result<Self> {
        let (read_fd, write_fd) = pipe()?;
        for fd in [&read_fd, &write_fd] {
            let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL).map_err(nix_to_io)?;
            let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
            fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags)).map_err(nix_to_io)?;
        }
        Ok(Self { items: Mutex::new(VecDeque::new()), wake_read: read_fd, wake_write: write_fd })
    }

    /// The fd the main loop's multiplexer registers for read-readiness.
    pub fn wake_fd(&self) -> RawFd {
        self.wake_read.as_raw_fd()
    }

    /// Called from the audio-capture thread. Pushing never blocks; the wake
    /// write is non-blocking and a full pipe (an already-pending wakeup) is
    /// not an error, since the consumer drains the whole queue on each wake.
    pub fn push(&self, item: AudioBlock) {
        self.items.lock().expect("audio queue mutex poisoned").push_back(item);
        match write(&self.wake_write, &[1u8]) {
            Ok(_) | Err(nix::errno::Errno::EAGAIN) => {}
            Err(e) => panic!("audio wake pipe write failed: {e}"),
        }
    }

    /// Drains every queued item and consumes (at most) one pending wake
    /// byte. Call after observing the wake fd as readable.
    pub fn drain(&self) -> Vec<AudioBlock> {
        let mut buf = [0u8; 64];
        loop {
            match read(self.wake_read.as_raw_fd(), &mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(e) => panic!("audio wake pipe read failed: {e}"),
            }
        }
        let mut items = self.items.lock().expect("audio queue mutex poisoned");
        items.drain(..).collect()
    }
}

fn nix_to_io(e: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}

/// Adapts a shared `AudioQueue` to `AsRawFd` so the main loop can register
/// its wake pipe with `tokio::io::unix::AsyncFd` without taking the queue
/// away from the audio thread.
pub struct AudioWaker(pub Arc<AudioQueue>);

impl AsRawFd for AudioWaker {
    fn as_raw_fd(&self) -> RawFd {
        self.0.wake_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn eight_producers_one_hundred_k_each_are_all_consumed_in_fifo_order_per_producer() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 100_000;

        let queue = Arc::new(AudioQueue::new().unwrap());
        let mut handles = Vec::new();
        for producer_id in 0..PRODUCERS {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    let mut pcm = Vec::with_capacity(8);
                    pcm.extend_from_slice(&(producer_id as u32).to_le_bytes());
                    pcm.extend_from_slice(&(seq as u32).to_le_bytes());
                    queue.push(AudioBlock { pcm, latency_ms: 0 });
                }
            }));
        }

        let mut last_seq_per_producer = vec![None; PRODUCERS];
        let mut total = 0usize;
        while total < PRODUCERS * PER_PRODUCER {
            let batch = queue.drain();
            for item in batch {
                let producer_id = u32::from_le_bytes(item.pcm[0..4].try_into().unwrap()) as usize;
                let seq = u32::from_le_bytes(item.pcm[4..8].try_into().unwrap()) as usize;
                match last_seq_per_producer[producer_id] {
                    None => assert_eq!(seq, 0),
                    Some(prev) => assert_eq!(seq, prev + 1, "producer {producer_id} out of order"),
                }
                last_seq_per_producer[producer_id] = Some(seq);
                total += 1;
            }
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(total, PRODUCERS * PER_PRODUCER);
        for last in last_seq_per_producer {
            assert_eq!(last, Some(PER_PRODUCER - 1));
        }
    }
}
