use std::collections::VecDeque;

use parking_lot::Mutex;

use super::task::Task;

/// Shared pool of pending tasks.
///
/// Withdrawal removes the task under the lock, so a task is handed to at most
/// one worker at a time. Taking from an empty queue never blocks.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task at the back.
    pub fn put(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }

    /// Take the task at the front, or `None` if the queue is empty.
    pub fn try_take(&self) -> Option<Task> {
        self.tasks.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }
}

impl FromIterator<Task> for TaskQueue {
    fn from_iter<T: IntoIterator<Item = Task>>(iter: T) -> Self {
        Self {
            tasks: Mutex::new(iter.into_iter().collect()),
        }
    }
}

impl Extend<Task> for TaskQueue {
    fn extend<T: IntoIterator<Item = Task>>(&mut self, iter: T) {
        self.tasks.get_mut().extend(iter);
    }
}
