//! Interrupt-to-main-loop handoff.
//!
//! Interrupt handlers only get an [`IsrHandle`]: they can queue typed
//! [`Task`]s and nothing else. The main loop owns the receiving end and runs
//! the tasks one at a time in FIFO order.

use crate::domain::error::{BridgeError, BridgeResult};
use crate::domain::models::{ScanEvent, Task, UartEvent};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Create the deferred-execution queue.
pub fn deferred_queue(capacity: usize) -> (IsrHandle, mpsc::Receiver<Task>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IsrHandle { tx }, rx)
}

#[derive(Debug, Clone)]
pub struct IsrHandle {
    tx: mpsc::Sender<Task>,
}

impl IsrHandle {
    /// Queue a task without blocking.
    pub fn defer(&self, task: Task) -> BridgeResult {
        self.tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(task) => {
                warn!("Deferred queue full, rejected {}", task_name(&task));
                BridgeError::QueueFull
            }
            mpsc::error::TrySendError::Closed(_) => {
                BridgeError::InvalidState("main loop is not running")
            }
        })
    }

    /// UART driver callback.
    pub fn on_uart_event(&self, event: UartEvent) -> BridgeResult {
        match event {
            UartEvent::Received(bytes) => {
                debug!("UART received {} bytes", bytes.len());
                self.defer(Task::UartRx(bytes))
            }
            other => {
                debug!("Ignoring UART event {:?}", other);
                Ok(())
            }
        }
    }

    /// Scanner callback.
    pub fn on_scan_event(&self, event: ScanEvent) -> BridgeResult {
        match event {
            ScanEvent::Received(adv) => {
                debug!("DATA");
                self.defer(Task::Broadcast(adv))
            }
            ScanEvent::Timeout => {
                debug!("Timeout");
                self.defer(Task::ScanTimeout)
            }
        }
    }
}

pub(crate) fn task_name(task: &Task) -> &'static str {
    match task {
        Task::UartRx(_) => "UartRx",
        Task::Broadcast(_) => "Broadcast",
        Task::ScanTimeout => "ScanTimeout",
        Task::SendAck { .. } => "SendAck",
        Task::SendDeviceId => "SendDeviceId",
        Task::TxFinished => "TxFinished",
    }
}
