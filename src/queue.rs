//! FIFO of buffers shared between a reader and a writer task
//!
//! The sequence itself is guarded by one mutex; the "data available" signal
//! is a separate `tokio::sync::Notify`, which is independent of the queue
//! lock by construction. The signal never protects the sequence, it only
//! announces that something changed.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::buffer::Buffer;
use crate::protocol::constants::NETBUF_SIZE;

/// Lock-guarded FIFO of `Buffer`s with a separate wakeup signal
#[derive(Debug, Default)]
pub struct BufferQueue {
    inner: Mutex<VecDeque<Buffer>>,
    available: Notify,
}

impl BufferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a buffer to the tail
    pub fn push(&self, buf: Buffer) {
        self.inner.lock().expect("queue lock poisoned").push_back(buf);
    }

    /// Remove and return the head, if any
    pub fn pop(&self) -> Option<Buffer> {
        self.inner.lock().expect("queue lock poisoned").pop_front()
    }

    /// Clone of the head without removing it
    pub fn peek(&self) -> Option<Buffer> {
        self.inner
            .lock()
            .expect("queue lock poisoned")
            .front()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().expect("queue lock poisoned").clear();
    }

    /// Remove the first buffer whose contents equal `target`
    ///
    /// Linear scan by contents identity. Returns true if one was removed.
    pub fn remove(&self, target: &Buffer) -> bool {
        let mut q = self.inner.lock().expect("queue lock poisoned");
        if let Some(pos) = q.iter().position(|b| b == target) {
            q.remove(pos);
            true
        } else {
            false
        }
    }

    /// Remove buffers at positions `begin..end`
    pub fn remove_range(&self, begin: usize, end: usize) {
        let mut q = self.inner.lock().expect("queue lock poisoned");
        let end = end.min(q.len());
        for idx in (begin..end).rev() {
            q.remove(idx);
        }
    }

    /// Reassemble a message split across multiple network reads
    ///
    /// Starting at the head, contiguous buffers are concatenated into one
    /// until the first buffer smaller than the nominal network read size,
    /// which marks the tail of the logically continued message. The consumed
    /// buffers are replaced at the head by the merged one, which is also
    /// returned. A head already smaller than the read size is returned
    /// unchanged (no-op merge).
    pub fn merge(&self) -> Option<Buffer> {
        let mut q = self.inner.lock().expect("queue lock poisoned");
        let head = q.pop_front()?;
        if head.len() < NETBUF_SIZE {
            q.push_front(head.clone());
            return Some(head);
        }

        let mut merged = head;
        while let Some(next) = q.pop_front() {
            let last = next.len() < NETBUF_SIZE;
            merged.append(next.as_slice());
            if last {
                break;
            }
        }
        q.push_front(merged.clone());
        Some(merged)
    }

    /// Block until a producer signals that data arrived
    pub async fn wait(&self) {
        self.available.notified().await;
    }

    /// Wake one waiter
    pub fn notify(&self) {
        self.available.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(bytes: &[u8]) -> Buffer {
        Buffer::from(bytes)
    }

    #[test]
    fn test_fifo_order() {
        let q = BufferQueue::new();
        q.push(buf(&[1]));
        q.push(buf(&[2]));
        q.push(buf(&[3]));

        assert_eq!(q.pop().unwrap(), buf(&[1]));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().unwrap(), buf(&[2]));
        assert_eq!(q.pop().unwrap(), buf(&[3]));
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let q = BufferQueue::new();
        q.push(buf(&[7, 7]));
        assert_eq!(q.peek().unwrap(), buf(&[7, 7]));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_remove_by_identity() {
        let q = BufferQueue::new();
        q.push(buf(&[1]));
        q.push(buf(&[2]));
        assert!(q.remove(&buf(&[2])));
        assert!(!q.remove(&buf(&[9])));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_remove_range() {
        let q = BufferQueue::new();
        for byte in 0u8..5 {
            q.push(buf(&[byte]));
        }
        q.remove_range(1, 3);

        assert_eq!(q.len(), 3);
        assert_eq!(q.pop().unwrap(), buf(&[0]));
        assert_eq!(q.pop().unwrap(), buf(&[3]));
        assert_eq!(q.pop().unwrap(), buf(&[4]));
    }

    #[test]
    fn test_merge_noop_on_small_head() {
        let q = BufferQueue::new();
        let small = buf(&[1, 2, 3]);
        q.push(small.clone());
        q.push(buf(&[4, 5]));

        let merged = q.merge().unwrap();
        assert_eq!(merged, small);
        // Nothing was consumed beyond the head
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_merge_concatenates_full_reads() {
        let q = BufferQueue::new();
        let full1 = Buffer::with_capacity(NETBUF_SIZE);
        let full2 = Buffer::with_capacity(NETBUF_SIZE);
        let tail = buf(&[0xAA, 0xBB]);
        q.push(full1);
        q.push(full2);
        q.push(tail);

        let merged = q.merge().unwrap();
        assert_eq!(merged.len(), NETBUF_SIZE * 2 + 2);
        assert_eq!(&merged.as_slice()[NETBUF_SIZE * 2..], &[0xAA, 0xBB]);
        // The consumed buffers were replaced by the merged one
        assert_eq!(q.len(), 1);
        assert_eq!(q.peek().unwrap(), merged);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_notify() {
        use std::sync::Arc;

        let q = Arc::new(BufferQueue::new());
        let waiter = Arc::clone(&q);
        let handle = tokio::spawn(async move {
            waiter.wait().await;
            waiter.pop()
        });

        // Give the waiter a chance to park first
        tokio::task::yield_now().await;
        q.push(buf(&[5]));
        q.notify();

        let popped = handle.await.unwrap();
        assert_eq!(popped.unwrap(), buf(&[5]));
    }
}
