use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

enum Message {
    Run(Task),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget tasks run one after another, in the order they were spawned.
#[derive(Debug, Clone)]
pub struct BackgroundTasks {
    tx: mpsc::UnboundedSender<Message>,
}

impl BackgroundTasks {
    /// Starts the worker. Must be called from within a Tokio runtime.
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Run(task) => {
                        // A panicking task must not take the worker down with it.
                        if let Err(err) = tokio::spawn(task).await {
                            tracing::warn!(?err, "background task panicked");
                        }
                    }
                    Message::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tx.send(Message::Run(Box::pin(fut))).is_err() {
            tracing::warn!("background worker stopped; dropping task");
        }
    }

    /// Waits until every task spawned so far has finished.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Message::Flush(done)).is_err() {
            return;
        }
        let _ = wait.await;
    }
}
