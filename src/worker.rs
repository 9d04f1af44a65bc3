use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;

use crate::Result;
use crate::capture::CaptureResult;
use crate::device::Device;
use crate::dispatch::CaptureRequest;
use crate::stream::CancellationToken;
use crate::sys::Transport;

enum Command {
    Capture(CaptureRequest, CancellationToken),
    Shutdown,
}

/// Runs captures on a dedicated thread, so that a caller such as a user interface is never
/// blocked for the length of a streaming capture.
///
/// Requests are carried out in the order they were submitted, and every request produces
/// exactly one result.
pub struct CaptureWorker<T: Transport + Send + 'static> {
    command_send: Sender<Command>,
    result_recv: Receiver<Result<CaptureResult>>,
    thread: JoinHandle<Device<T>>,
}

impl<T: Transport + Send + 'static> CaptureWorker<T> {
    pub fn spawn(mut device: Device<T>) -> CaptureWorker<T> {
        let (command_send, command_recv) = mpsc::channel();
        let (result_send, result_recv) = mpsc::channel();
        let thread = std::thread::spawn(move || {
            for command in command_recv {
                match command {
                    Command::Capture(request, cancel) => {
                        let result = device.dispatch_cancellable(&request, &cancel);
                        if let Err(ref error) = result {
                            log::warn!("capture worker: {}", error);
                        }
                        if result_send.send(result).is_err() {
                            break
                        }
                    }
                    Command::Shutdown => break,
                }
            }
            log::debug!("capture worker: exiting");
            device
        });
        CaptureWorker { command_send, result_recv, thread }
    }

    /// Queue a capture. The returned token cancels it if it turns out to be a streaming capture.
    pub fn submit(&self, request: CaptureRequest) -> CancellationToken {
        let cancel = CancellationToken::new();
        // if the worker is gone, `recv` reports it
        let _ = self.command_send.send(Command::Capture(request, cancel.clone()));
        cancel
    }

    /// Next finished capture, if there is one.
    pub fn try_recv(&self) -> Option<Result<CaptureResult>> {
        match self.result_recv.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next finished capture. Returns `None` if the worker thread has exited.
    pub fn recv(&self) -> Option<Result<CaptureResult>> {
        self.result_recv.recv().ok()
    }

    /// Stop the worker once the captures already queued are done, and take back the device.
    pub fn shutdown(self) -> Device<T> {
        let _ = self.command_send.send(Command::Shutdown);
        match self.thread.join() {
            Ok(device) => device,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}
