//! Sequential task queue for location generation
//!
//! Tasks are enqueued while the queue is paused and drained one at a time
//! after [`TaskQueue::run`]. A [`StopHandle`] cancels the run: the next
//! dequeue fails and any in-flight [`TaskQueue::interruptible`] wait returns
//! early with [`Error::Cancelled`].

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::trace;

use crate::error::{Error, Result};

/// Cloneable handle that stops a running generation
#[derive(Debug, Clone)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StopHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Stop the current run
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }

    /// Clear the flag before a new run
    pub(crate) fn reset(&self) {
        self.sender.send_replace(false);
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

pub struct TaskQueue<T> {
    tasks: VecDeque<T>,
    running: bool,
    /// Wait between two tasks
    pause: Duration,
    dequeued: usize,
    stop: watch::Receiver<bool>,
}

impl<T> TaskQueue<T> {
    /// New paused queue
    pub fn new(pause: Duration, stop: &StopHandle) -> Self {
        Self {
            tasks: VecDeque::new(),
            running: false,
            pause,
            dequeued: 0,
            stop: stop.subscribe(),
        }
    }

    pub fn enqueue(&mut self, task: T) {
        self.tasks.push_back(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Start draining
    pub fn run(&mut self) {
        self.running = true;
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Next task, after the inter-task pause
    ///
    /// Returns None once drained or while paused.
    pub async fn next(&mut self) -> Result<Option<T>> {
        if self.is_stopped() {
            return Err(Error::Cancelled);
        }
        if !self.running {
            return Ok(None);
        }

        let Some(task) = self.tasks.pop_front() else {
            self.running = false;
            return Ok(None);
        };

        if self.dequeued > 0 && !self.pause.is_zero() {
            trace!("Pausing {:?} before next task", self.pause);
            let pause = self.pause;
            self.interruptible(tokio::time::sleep(pause)).await?;
        }
        self.dequeued += 1;

        Ok(Some(task))
    }

    /// Await `fut` unless the queue is stopped first
    pub async fn interruptible<F: Future>(&mut self, fut: F) -> Result<F::Output> {
        if self.is_stopped() {
            return Err(Error::Cancelled);
        }

        tokio::select! {
            output = fut => Ok(output),
            Ok(_) = self.stop.wait_for(|stopped| *stopped) => Err(Error::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drains_in_order_after_run() {
        let stop = StopHandle::new();
        let mut queue = TaskQueue::new(Duration::ZERO, &stop);
        queue.enqueue(1);
        queue.enqueue(2);

        // Paused until run
        assert_eq!(queue.next().await.unwrap(), None);
        assert_eq!(queue.len(), 2);

        queue.run();
        assert_eq!(queue.next().await.unwrap(), Some(1));
        assert_eq!(queue.next().await.unwrap(), Some(2));
        assert_eq!(queue.next().await.unwrap(), None);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_stop_prevents_further_tasks() {
        let stop = StopHandle::new();
        let mut queue = TaskQueue::new(Duration::ZERO, &stop);
        queue.enqueue("a");
        queue.enqueue("b");
        queue.run();

        assert_eq!(queue.next().await.unwrap(), Some("a"));
        stop.stop();
        assert!(matches!(queue.next().await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_stop_interrupts_wait() {
        let stop = StopHandle::new();
        let mut queue: TaskQueue<()> = TaskQueue::new(Duration::ZERO, &stop);

        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            stopper.stop();
        });

        let result = queue.interruptible(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(stop.is_stopped());

        stop.reset();
        assert!(!queue.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_tasks() {
        let stop = StopHandle::new();
        let mut queue = TaskQueue::new(Duration::from_millis(100), &stop);
        queue.enqueue(1);
        queue.enqueue(2);
        queue.run();

        let started = tokio::time::Instant::now();
        queue.next().await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO);
        queue.next().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
