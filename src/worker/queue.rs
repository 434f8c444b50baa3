//! FIFO admission queue of generation tasks.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::error::{Result, VanityError};
use crate::matcher::Pattern;

use super::pool::{GenerationRequest, GenerationResult};

/// A queued unit of work: `count` sequential generations of one request.
pub struct GenerationTask {
    id: u64,
    template: GenerationRequest,
    count: usize,
    completed: usize,
    succeeded: usize,
    enqueued_at: Instant,
    reply: Option<Sender<Result<GenerationResult>>>,
}

impl GenerationTask {
    /// A single generation whose result goes back to the waiting caller.
    pub fn single(request: GenerationRequest, reply: Sender<Result<GenerationResult>>) -> Self {
        Self {
            id: 0,
            template: request,
            count: 1,
            completed: 0,
            succeeded: 0,
            enqueued_at: Instant::now(),
            reply: Some(reply),
        }
    }

    /// A batch whose results go to the engine's result sink.
    pub fn batch(request: GenerationRequest, count: usize) -> Self {
        Self {
            id: 0,
            template: request,
            count,
            completed: 0,
            succeeded: 0,
            enqueued_at: Instant::now(),
            reply: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pattern(&self) -> &Pattern {
        &self.template.pattern
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn remaining(&self) -> usize {
        self.count - self.completed
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.count
    }

    /// Time spent since the task was queued.
    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Caller waiting on this task, if it was submitted directly.
    pub fn reply(&self) -> Option<&Sender<Result<GenerationResult>>> {
        self.reply.as_ref()
    }

    /// The request for the next generation of this task.
    ///
    /// Batch generations are identified as `batch-{task}-{n}`, counting from 1.
    pub fn next_request(&self) -> GenerationRequest {
        let mut request = self.template.clone();
        if self.reply.is_none() {
            request.identifier = format!("batch-{}-{}", self.id, self.completed + 1);
        }
        request
    }

    /// Marks one generation as finished.
    pub fn record(&mut self, succeeded: bool) {
        self.completed += 1;
        if succeeded {
            self.succeeded += 1;
        }
    }
}

/// Single FIFO of tasks. The head task stays queued until all its generations finish.
pub struct TaskQueue {
    tasks: VecDeque<GenerationTask>,
    capacity: usize,
    next_id: u64,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: VecDeque::new(),
            capacity,
            next_id: 1,
        }
    }

    /// Appends a task and returns its 1-based position, counting the task in flight.
    pub fn push(&mut self, mut task: GenerationTask) -> Result<usize> {
        if self.tasks.len() >= self.capacity {
            return Err(VanityError::TaskAddFailed(format!(
                "queue is full ({} tasks)",
                self.capacity
            )));
        }
        if task.count == 0 {
            return Err(VanityError::TaskAddFailed("count must be at least 1".into()));
        }
        task.id = self.next_id;
        self.next_id += 1;
        self.tasks.push_back(task);
        Ok(self.tasks.len())
    }

    pub fn front(&self) -> Option<&GenerationTask> {
        self.tasks.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut GenerationTask> {
        self.tasks.front_mut()
    }

    /// Removes the head task once it is done.
    pub fn pop_finished(&mut self) -> Option<GenerationTask> {
        if self.tasks.front().map_or(false, GenerationTask::is_done) {
            self.tasks.pop_front()
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenerationTask> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Removes every task, returning them in queue order.
    pub fn drain(&mut self) -> Vec<GenerationTask> {
        self.tasks.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Position;

    fn request(text: &str) -> GenerationRequest {
        let pattern = Pattern::new(text, Position::Start, false).unwrap();
        GenerationRequest::new(pattern, "req", Duration::from_secs(1))
    }

    #[test]
    fn test_fifo_with_counts() {
        let mut queue = TaskQueue::new(10);
        assert_eq!(queue.push(GenerationTask::batch(request("AB"), 2)).unwrap(), 1);
        assert_eq!(queue.push(GenerationTask::batch(request("CD"), 1)).unwrap(), 2);

        let head = queue.front_mut().unwrap();
        assert_eq!(head.pattern().text(), "AB");
        assert_eq!(head.next_request().identifier, "batch-1-1");
        head.record(true);
        assert!(queue.pop_finished().is_none());

        let head = queue.front_mut().unwrap();
        assert_eq!(head.pattern().text(), "AB");
        assert_eq!(head.next_request().identifier, "batch-1-2");
        head.record(false);
        let done = queue.pop_finished().unwrap();
        assert_eq!(done.succeeded(), 1);

        assert_eq!(queue.front().unwrap().pattern().text(), "CD");
        assert_eq!(queue.front().unwrap().id(), 2);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut queue = TaskQueue::new(1);
        queue.push(GenerationTask::batch(request("AB"), 1)).unwrap();
        let err = queue.push(GenerationTask::batch(request("CD"), 1)).unwrap_err();
        assert_eq!(err.code(), "TASK_ADD_FAILED");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_zero_count_rejected() {
        let mut queue = TaskQueue::new(4);
        assert!(queue.push(GenerationTask::batch(request("AB"), 0)).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_single_keeps_identifier() {
        let (tx, _rx) = crossbeam_channel::bounded(1);
        let mut queue = TaskQueue::new(4);
        queue.push(GenerationTask::single(request("AB"), tx)).unwrap();
        let head = queue.front().unwrap();
        assert_eq!(head.next_request().identifier, "req");
        assert!(head.reply().is_some());
    }
}
