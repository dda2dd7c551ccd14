//! Task Pollers
//!
//! One cancellable polling loop per task. A loop issues a status request,
//! waits for it to settle, forwards the result to the controller inbox and
//! only then sleeps, so results for one task arrive in request order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::core::backend::ParserBackend;
use crate::core::TaskId;

use super::controller::Completion;

/// Live polling loops keyed by task id
#[derive(Debug, Default)]
pub(crate) struct PollRegistry {
    handles: HashMap<TaskId, JoinHandle<()>>,
}

impl PollRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Starts polling `task_id`. Returns false if it is already polled.
    pub(crate) fn start(
        &mut self,
        task_id: &str,
        backend: Arc<dyn ParserBackend>,
        interval: Duration,
        inbox: mpsc::UnboundedSender<Completion>,
    ) -> bool {
        if self.is_polling(task_id) {
            return false;
        }

        debug!("Polling task {} every {:?}", task_id, interval);
        let handle = tokio::spawn(poll_loop(task_id.to_string(), backend, interval, inbox));
        self.handles.insert(task_id.to_string(), handle);
        true
    }

    /// Aborts the loop for `task_id`. Returns false if none was running.
    pub(crate) fn cancel(&mut self, task_id: &str) -> bool {
        match self.handles.remove(task_id) {
            Some(handle) => {
                handle.abort();
                debug!("Stopped polling task {}", task_id);
                true
            }
            None => false,
        }
    }

    /// Forgets a loop that ended on its own after a terminal status
    pub(crate) fn finish(&mut self, task_id: &str) -> bool {
        self.cancel(task_id)
    }

    pub(crate) fn is_polling(&self, task_id: &str) -> bool {
        self.handles.contains_key(task_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, handle) in self.handles.drain() {
            handle.abort();
        }
    }
}

impl Drop for PollRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn poll_loop(
    task_id: TaskId,
    backend: Arc<dyn ParserBackend>,
    interval: Duration,
    inbox: mpsc::UnboundedSender<Completion>,
) {
    loop {
        let result = backend.task_status(&task_id).await;
        let terminal = matches!(&result, Ok(snapshot) if snapshot.status.is_terminal());

        let completion = Completion::Polled {
            task_id: task_id.clone(),
            result,
        };
        if inbox.send(completion).is_err() || terminal {
            break;
        }

        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::{MockOperation, MockParserBackend};
    use crate::core::tasks::{StatusSnapshot, Task, TaskStatus};

    #[tokio::test]
    async fn test_loop_stops_after_terminal_status() {
        let mock = Arc::new(
            MockParserBackend::new()
                .with_task(Task::new("T1", "u"))
                .with_status_script(
                    "T1",
                    vec![
                        StatusSnapshot::new(TaskStatus::Processing, 10),
                        StatusSnapshot::failed("boom"),
                    ],
                ),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = PollRegistry::new();

        assert!(registry.start("T1", mock.clone(), Duration::from_millis(5), tx.clone()));
        assert!(!registry.start("T1", mock.clone(), Duration::from_millis(5), tx));

        let mut statuses = Vec::new();
        while let Some(Completion::Polled { result, .. }) = rx.recv().await {
            let status = result.unwrap().status;
            statuses.push(status);
            if status.is_terminal() {
                break;
            }
        }
        assert_eq!(statuses, vec![TaskStatus::Processing, TaskStatus::Failed]);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(mock.status_calls("T1"), 2);
    }

    #[tokio::test]
    async fn test_errors_keep_polling() {
        let mock = Arc::new(MockParserBackend::new().with_task(Task::new("T1", "u")));
        mock.fail_next(MockOperation::Status, 2);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut registry = PollRegistry::new();
        registry.start("T1", mock.clone(), Duration::from_millis(1), tx);

        let mut errors = 0;
        while let Some(Completion::Polled { result, .. }) = rx.recv().await {
            match result {
                Err(_) => errors += 1,
                Ok(_) => break,
            }
        }
        assert_eq!(errors, 2);
        registry.cancel_all();
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_requests() {
        let mock = Arc::new(MockParserBackend::new().with_task(Task::new("T1", "u")));
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut registry = PollRegistry::new();
        registry.start("T1", mock.clone(), Duration::from_millis(2), tx);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(registry.cancel("T1"));
        assert!(!registry.cancel("T1"));

        // Let an in-flight abort settle before sampling
        tokio::time::sleep(Duration::from_millis(5)).await;
        let after_cancel = mock.status_calls("T1");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mock.status_calls("T1"), after_cancel);
    }
}
