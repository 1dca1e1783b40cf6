use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{render::Drawable, Result, SeedheadError};

/// Identifier shared by a worker, its draw registry slot and its sequencer
/// control entry.
pub type TaskId = u32;

/// Shared "what to draw this frame" table. Each task owns exactly one key;
/// the main loop reads a snapshot of the whole table every frame.
#[derive(Default)]
pub struct DrawRegistry {
    entries: Mutex<BTreeMap<TaskId, Arc<dyn Drawable>>>,
}

impl DrawRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `drawable` under `task`, replacing any previous entry.
    /// Publishing `None` removes the entry; removing an unknown task is a
    /// no-op.
    pub fn publish(&self, task: TaskId, drawable: Option<Arc<dyn Drawable>>) -> Result<()> {
        let mut entries = self.lock()?;
        match drawable {
            Some(drawable) => {
                entries.insert(task, drawable);
            }
            None => {
                if entries.remove(&task).is_none() {
                    tracing::trace!(task, "unpublish for task without an entry");
                }
            }
        }
        Ok(())
    }

    pub fn unpublish(&self, task: TaskId) -> Result<()> {
        self.publish(task, None)
    }

    /// Copies the current entries out so the caller can draw without holding
    /// the lock. Ordered by task id.
    pub fn snapshot(&self) -> Result<Vec<(TaskId, Arc<dyn Drawable>)>> {
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .map(|(task, drawable)| (*task, Arc::clone(drawable)))
            .collect())
    }

    pub fn get(&self, task: TaskId) -> Result<Option<Arc<dyn Drawable>>> {
        Ok(self.lock()?.get(&task).cloned())
    }

    pub fn contains(&self, task: TaskId) -> Result<bool> {
        Ok(self.lock()?.contains_key(&task))
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<TaskId, Arc<dyn Drawable>>>> {
        self.entries
            .lock()
            .map_err(|_| SeedheadError::msg("draw registry has been poisoned"))
    }
}

impl std::fmt::Debug for DrawRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tasks: Vec<TaskId> = self
            .entries
            .lock()
            .map(|entries| entries.keys().copied().collect())
            .unwrap_or_default();
        f.debug_struct("DrawRegistry").field("tasks", &tasks).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::render::Frame;

    struct Tagged;

    impl Drawable for Tagged {
        fn draw(&self, _frame: &mut Frame<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn tagged() -> Arc<dyn Drawable> {
        Arc::new(Tagged)
    }

    fn same_object(a: &Arc<dyn Drawable>, b: &Arc<dyn Drawable>) -> bool {
        std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
    }

    #[test]
    fn publish_replaces_and_unpublish_removes() {
        let registry = DrawRegistry::new();
        registry.publish(1, Some(tagged())).unwrap();
        registry.publish(1, Some(tagged())).unwrap();
        assert_eq!(registry.len().unwrap(), 1);

        registry.unpublish(1).unwrap();
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn unpublishing_unknown_task_is_a_no_op() {
        let registry = DrawRegistry::new();
        registry.publish(2, Some(tagged())).unwrap();
        registry.unpublish(7).unwrap();
        assert!(registry.contains(2).unwrap());
        assert!(!registry.contains(7).unwrap());
    }

    #[test]
    fn snapshot_is_ordered_by_task() {
        let registry = DrawRegistry::new();
        for task in [5, 1, 3] {
            registry.publish(task, Some(tagged())).unwrap();
        }
        let ids: Vec<TaskId> = registry
            .snapshot()
            .unwrap()
            .into_iter()
            .map(|(task, _)| task)
            .collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn concurrent_publishers_leave_an_empty_registry() {
        let registry = Arc::new(DrawRegistry::new());
        let writers: Vec<_> = (1..=3)
            .map(|task| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let mine = tagged();
                        registry.publish(task, Some(Arc::clone(&mine))).unwrap();
                        // Only this thread writes `task`, so the entry must
                        // be the one just published.
                        let seen = registry.get(task).unwrap().expect("own entry present");
                        assert!(same_object(&seen, &mine));
                    }
                    registry.unpublish(task).unwrap();
                })
            })
            .collect();

        let reader = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let snapshot = registry.snapshot().unwrap();
                    assert!(snapshot.len() <= 3);
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();
        assert!(registry.is_empty().unwrap());
    }
}
