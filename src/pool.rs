//! Browser render pool
//!
//! A fixed number of worker threads, each owning one renderer, fronted by
//! an async facade. Callers ship markup through a channel and await the
//! captured bytes; the semaphore over the worker set is the pipeline's one
//! and only backpressure mechanism.
//!
//! Slot recovery is unconditional: success returns the worker, a crash
//! replaces it with a freshly created one, and a timeout retires the busy
//! worker off-pool (it finishes or dies on its own thread) while a
//! replacement takes its place. The semaphore permit is released on every
//! one of those paths.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::warn;
use tokio::sync::{oneshot, Semaphore};

use crate::batch::CancelFlag;
use crate::error::{Error, Result};
use crate::renderer::RendererFactory;
use crate::Canvas;

enum Command {
    Capture {
        markup: String,
        canvas: Canvas,
        resp: oneshot::Sender<Result<Vec<u8>>>,
    },
}

/// Handle to one worker thread owning a renderer
struct Worker {
    cmd_tx: std::sync::mpsc::Sender<Command>,
}

impl Worker {
    /// Spawn a worker thread and wait for its renderer to come up.
    ///
    /// The renderer is created on the worker thread itself (it does not
    /// have to be `Send`); creation failure is reported back through the
    /// init channel.
    async fn spawn(factory: Arc<dyn RendererFactory>) -> Result<Self> {
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        thread::spawn(move || {
            let mut renderer = match factory.create() {
                Ok(r) => r,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            let _ = init_tx.send(Ok(()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Capture {
                        markup,
                        canvas,
                        resp,
                    } => {
                        let res = renderer.capture(&markup, canvas);
                        // Receiver may have timed out and gone away
                        let _ = resp.send(res);
                    }
                }
            }
        });

        init_rx
            .await
            .map_err(|_| Error::BrowserCrash("worker thread died during init".to_string()))??;
        Ok(Self { cmd_tx })
    }
}

/// A bounded pool of isolated browser execution contexts
pub struct RenderPool {
    factory: Arc<dyn RendererFactory>,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<Worker>>,
    size: usize,
    capture_timeout: Duration,
}

impl std::fmt::Debug for RenderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPool")
            .field("size", &self.size)
            .field("capture_timeout", &self.capture_timeout)
            .finish_non_exhaustive()
    }
}

impl RenderPool {
    /// Create a pool of `size` workers, each with its own renderer.
    ///
    /// Fails if any renderer cannot be created; a pool that starts is a
    /// pool whose every slot works.
    pub async fn new(
        factory: Arc<dyn RendererFactory>,
        size: usize,
        capture_timeout: Duration,
    ) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidBatchRequest(
                "render pool size must be at least 1".to_string(),
            ));
        }
        let mut idle = Vec::with_capacity(size);
        for _ in 0..size {
            idle.push(Worker::spawn(Arc::clone(&factory)).await?);
        }
        Ok(Self {
            factory,
            semaphore: Arc::new(Semaphore::new(size)),
            idle: Mutex::new(idle),
            size,
            capture_timeout: capture_timeout.max(Duration::from_millis(1)),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Render markup into PNG bytes on one pool slot.
    ///
    /// Blocks (asynchronously) while the pool is exhausted. Cancellation
    /// is re-checked the moment a slot is acquired, so jobs queued behind
    /// in-flight renders stop without rendering. The slot is recovered
    /// whatever happens: timeouts and crashes retire the worker and
    /// install a fresh one before the permit is released.
    pub async fn capture(
        &self,
        markup: &str,
        canvas: Canvas,
        cancel: &CancelFlag,
    ) -> Result<Vec<u8>> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::BrowserCrash("render pool closed".to_string()))?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let worker = match self.checkout().await {
            Ok(w) => w,
            Err(e) => return Err(e),
        };

        let (resp_tx, resp_rx) = oneshot::channel();
        let sent = worker.cmd_tx.send(Command::Capture {
            markup: markup.to_string(),
            canvas,
            resp: resp_tx,
        });
        if sent.is_err() {
            // Worker thread is already gone; swap in a replacement.
            self.replace_worker().await;
            return Err(Error::BrowserCrash("worker channel closed".to_string()));
        }

        match tokio::time::timeout(self.capture_timeout, resp_rx).await {
            Ok(Ok(Ok(bytes))) => {
                self.idle.lock().unwrap().push(worker);
                Ok(bytes)
            }
            Ok(Ok(Err(err))) => {
                if matches!(err, Error::BrowserCrash(_)) {
                    // Never reuse a context that misbehaved mid-render.
                    drop(worker);
                    self.replace_worker().await;
                } else {
                    self.idle.lock().unwrap().push(worker);
                }
                Err(err)
            }
            Ok(Err(_)) => {
                drop(worker);
                self.replace_worker().await;
                Err(Error::BrowserCrash(
                    "worker thread died mid-render".to_string(),
                ))
            }
            Err(_) => {
                // The worker is still busy; dropping its channel retires it
                // once the stuck render finishes or its browser dies.
                drop(worker);
                self.replace_worker().await;
                Err(Error::RenderTimeout(self.capture_timeout.as_millis() as u64))
            }
        }
    }

    /// Pop an idle worker, spawning one on demand if a previous
    /// replacement failed and left the idle set short.
    async fn checkout(&self) -> Result<Worker> {
        if let Some(worker) = self.idle.lock().unwrap().pop() {
            return Ok(worker);
        }
        Worker::spawn(Arc::clone(&self.factory)).await
    }

    /// Best-effort replacement of a retired worker. On failure the slot
    /// stays usable: the next checkout spawns on demand.
    async fn replace_worker(&self) {
        match Worker::spawn(Arc::clone(&self.factory)).await {
            Ok(worker) => self.idle.lock().unwrap().push(worker),
            Err(err) => warn!("failed to replace render worker: {}", err),
        }
    }
}
