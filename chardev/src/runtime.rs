//! Dispatch runtime for the device
//!
//! This module plays the part of the OS layer in front of the device. It
//! handles:
//! - POSIX-style requests (open, read, write, lseek, ioctl, close) on
//!   integer file descriptors
//! - the file descriptor table (fd → session)
//! - running device operations concurrently while keeping each session
//!   in use by at most one operation
//!
//! Results follow the kernel convention: a non-negative value on success,
//! a negated errno on failure.

use std::collections::HashMap;
use std::future::Future;
use std::os::raw::c_int;
use std::pin::Pin;
use std::sync::Arc;

use embedded_io::SeekFrom;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::device::BufferManager;
use crate::error::{DeviceError, EBADF, EBUSY};
use crate::interrupt::Interrupter;
use crate::session::Session;

/// Requests sent from a [`DeviceClient`] to the [`DeviceRuntime`]
pub enum IoRequest {
    /// Open a new session (returns fd)
    Open { response: oneshot::Sender<c_int> },
    /// Read up to `len` bytes (returns count and the bytes read)
    Read {
        fd: c_int,
        len: usize,
        response: oneshot::Sender<(isize, Vec<u8>)>,
    },
    /// Write `data` at the session cursor (returns count)
    Write {
        fd: c_int,
        data: Vec<u8>,
        response: oneshot::Sender<isize>,
    },
    /// Move the session cursor (returns new offset)
    Seek {
        fd: c_int,
        pos: SeekFrom,
        response: oneshot::Sender<i64>,
    },
    /// Control command; `None` stands for a null argument pointer
    Ioctl {
        fd: c_int,
        command: u32,
        arg: Option<i32>,
        response: oneshot::Sender<(c_int, Option<i32>)>,
    },
    /// Raise the interrupt signal of the session behind `fd`
    Interrupt {
        fd: c_int,
        response: oneshot::Sender<c_int>,
    },
    /// Close the session behind `fd`
    Close {
        fd: c_int,
        response: oneshot::Sender<c_int>,
    },
}

/// Result of a completed device operation
///
/// Every variant hands the session back so it can return to its slot.
pub enum IoEvent {
    ReadComplete {
        fd: c_int,
        session: Session,
        bytes_read: isize,
        data: Vec<u8>,
        response: oneshot::Sender<(isize, Vec<u8>)>,
    },
    WriteComplete {
        fd: c_int,
        session: Session,
        bytes_written: isize,
        response: oneshot::Sender<isize>,
    },
    SeekComplete {
        fd: c_int,
        session: Session,
        position: i64,
        response: oneshot::Sender<i64>,
    },
    IoctlComplete {
        fd: c_int,
        session: Session,
        result: c_int,
        arg: Option<i32>,
        response: oneshot::Sender<(c_int, Option<i32>)>,
    },
}

/// Type alias for I/O futures
pub type IoFuture = Pin<Box<dyn Future<Output = IoEvent> + Send>>;

fn neg_errno(e: &DeviceError) -> c_int {
    -e.errno()
}

/// An open file: the session (`None` while an operation runs) and a way to
/// interrupt it
struct OpenFile {
    session: Option<Session>,
    interrupter: Interrupter,
}

/// Per-runtime file descriptor table
pub struct FdTable {
    table: HashMap<c_int, OpenFile>,
    next_fd: c_int,
}

impl FdTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
            next_fd: 0,
        }
    }

    /// Allocate a new fd for the session
    fn insert(&mut self, session: Session) -> c_int {
        let fd = self.next_fd;
        self.next_fd += 1;
        let interrupter = session.interrupter();
        self.table.insert(
            fd,
            OpenFile {
                session: Some(session),
                interrupter,
            },
        );
        fd
    }

    /// Take the session out of its slot for an operation
    ///
    /// Fails with `EBADF` for an unknown fd and `EBUSY` while another
    /// operation holds the session.
    fn take(&mut self, fd: c_int) -> Result<Session, c_int> {
        let file = self.table.get_mut(&fd).ok_or(-EBADF)?;
        file.session.take().ok_or(-EBUSY)
    }

    /// Put a session back into its slot after an operation
    ///
    /// A busy fd cannot be closed, so the slot is still there.
    fn restore(&mut self, fd: c_int, session: Session) {
        if let Some(file) = self.table.get_mut(&fd) {
            file.session = Some(session);
        }
    }

    fn interrupter(&self, fd: c_int) -> Option<&Interrupter> {
        self.table.get(&fd).map(|file| &file.interrupter)
    }

    /// Close an fd
    ///
    /// Fails with `EBADF` for an unknown fd and `EBUSY` while an operation
    /// holds the session.
    fn remove(&mut self, fd: c_int) -> Result<(), c_int> {
        let file = self.table.get(&fd).ok_or(-EBADF)?;
        if file.session.is_none() {
            return Err(-EBUSY);
        }
        self.table.remove(&fd);
        Ok(())
    }

    /// Number of open fds
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

/// `DeviceRuntime` dispatches client requests onto device sessions
pub struct DeviceRuntime {
    device: Arc<BufferManager>,
    request_tx: mpsc::UnboundedSender<IoRequest>,
    request_rx: mpsc::UnboundedReceiver<IoRequest>,
}

impl DeviceRuntime {
    #[must_use]
    pub fn new(device: Arc<BufferManager>) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        Self {
            device,
            request_tx,
            request_rx,
        }
    }

    /// Create a client for this runtime
    ///
    /// Clients made before `run()` keep working; clone them to get more.
    #[must_use]
    pub fn client(&self) -> DeviceClient {
        DeviceClient {
            tx: self.request_tx.clone(),
        }
    }

    /// Main event loop
    ///
    /// Returns once every client is gone and no operation is pending. Open
    /// sessions are closed on the way out.
    pub async fn run(self) {
        let Self {
            device,
            request_tx,
            mut request_rx,
        } = self;
        // Drop our copy of the sender so the channel closes with the last client
        drop(request_tx);

        let mut dispatch = Dispatch {
            device,
            files: FdTable::new(),
        };
        let mut pending_ops: FuturesUnordered<IoFuture> = FuturesUnordered::new();
        let mut request_rx_open = true;

        loop {
            if !request_rx_open && pending_ops.is_empty() {
                info!(open_fds = dispatch.files.len(), "no more work, exiting");
                break;
            }

            tokio::select! {
                request = request_rx.recv(), if request_rx_open => {
                    let Some(request) = request else {
                        debug!("request channel closed");
                        request_rx_open = false;
                        continue;
                    };
                    if let Some(fut) = dispatch.handle_request(request) {
                        pending_ops.push(fut);
                    }
                }

                Some(event) = pending_ops.next(), if !pending_ops.is_empty() => {
                    dispatch.handle_event(event);
                }
            }
        }
    }
}

/// Loop state of a running [`DeviceRuntime`]
struct Dispatch {
    device: Arc<BufferManager>,
    files: FdTable,
}

impl Dispatch {
    fn handle_request(&mut self, request: IoRequest) -> Option<IoFuture> {
        match request {
            IoRequest::Open { response } => {
                self.handle_open(response);
                None
            }
            IoRequest::Read { fd, len, response } => self.handle_read(fd, len, response),
            IoRequest::Write { fd, data, response } => self.handle_write(fd, data, response),
            IoRequest::Seek { fd, pos, response } => self.handle_seek(fd, pos, response),
            IoRequest::Ioctl {
                fd,
                command,
                arg,
                response,
            } => self.handle_ioctl(fd, command, arg, response),
            IoRequest::Interrupt { fd, response } => {
                self.handle_interrupt(fd, response);
                None
            }
            IoRequest::Close { fd, response } => {
                self.handle_close(fd, response);
                None
            }
        }
    }

    fn handle_open(&mut self, response: oneshot::Sender<c_int>) {
        let session = self.device.open();
        let handle = session.handle();
        let fd = self.files.insert(session);
        debug!(fd, session = %handle, "opened");
        let _ = response.send(fd);
    }

    fn handle_read(
        &mut self,
        fd: c_int,
        len: usize,
        response: oneshot::Sender<(isize, Vec<u8>)>,
    ) -> Option<IoFuture> {
        trace!(fd, len, "processing Read");
        let mut session = match self.files.take(fd) {
            Ok(session) => session,
            Err(errno) => {
                warn!(fd, errno, "read rejected");
                let _ = response.send((errno as isize, Vec::new()));
                return None;
            }
        };
        Some(Box::pin(async move {
            let mut data = vec![0u8; len];
            let bytes_read = match session.read(&mut data[..]).await {
                Ok(n) => {
                    data.truncate(n);
                    n.cast_signed()
                }
                Err(e) => {
                    data.clear();
                    neg_errno(&e) as isize
                }
            };
            IoEvent::ReadComplete {
                fd,
                session,
                bytes_read,
                data,
                response,
            }
        }))
    }

    fn handle_write(
        &mut self,
        fd: c_int,
        data: Vec<u8>,
        response: oneshot::Sender<isize>,
    ) -> Option<IoFuture> {
        trace!(fd, bytes = data.len(), "processing Write");
        let mut session = match self.files.take(fd) {
            Ok(session) => session,
            Err(errno) => {
                warn!(fd, errno, "write rejected");
                let _ = response.send(errno as isize);
                return None;
            }
        };
        Some(Box::pin(async move {
            let bytes_written = match session.write(&data[..]).await {
                Ok(n) => n.cast_signed(),
                Err(e) => neg_errno(&e) as isize,
            };
            IoEvent::WriteComplete {
                fd,
                session,
                bytes_written,
                response,
            }
        }))
    }

    fn handle_seek(
        &mut self,
        fd: c_int,
        pos: SeekFrom,
        response: oneshot::Sender<i64>,
    ) -> Option<IoFuture> {
        trace!(fd, ?pos, "processing Seek");
        let mut session = match self.files.take(fd) {
            Ok(session) => session,
            Err(errno) => {
                warn!(fd, errno, "seek rejected");
                let _ = response.send(i64::from(errno));
                return None;
            }
        };
        Some(Box::pin(async move {
            let position = match session.seek(pos).await {
                Ok(offset) => i64::try_from(offset).unwrap_or(i64::MAX),
                Err(e) => i64::from(neg_errno(&e)),
            };
            IoEvent::SeekComplete {
                fd,
                session,
                position,
                response,
            }
        }))
    }

    fn handle_ioctl(
        &mut self,
        fd: c_int,
        command: u32,
        arg: Option<i32>,
        response: oneshot::Sender<(c_int, Option<i32>)>,
    ) -> Option<IoFuture> {
        trace!(fd, command, "processing Ioctl");
        let session = match self.files.take(fd) {
            Ok(session) => session,
            Err(errno) => {
                warn!(fd, errno, "ioctl rejected");
                let _ = response.send((errno, arg));
                return None;
            }
        };
        Some(Box::pin(async move {
            let mut arg = arg;
            let result = match session.control(command, &mut arg).await {
                Ok(()) => 0,
                Err(e) => neg_errno(&e),
            };
            IoEvent::IoctlComplete {
                fd,
                session,
                result,
                arg,
                response,
            }
        }))
    }

    fn handle_interrupt(&self, fd: c_int, response: oneshot::Sender<c_int>) {
        let result = if let Some(interrupter) = self.files.interrupter(fd) {
            interrupter.raise();
            debug!(fd, "interrupt raised");
            0
        } else {
            warn!(fd, "interrupt: fd not found");
            -EBADF
        };
        let _ = response.send(result);
    }

    fn handle_close(&mut self, fd: c_int, response: oneshot::Sender<c_int>) {
        let result = match self.files.remove(fd) {
            Ok(()) => {
                debug!(fd, "closed");
                0
            }
            Err(errno) => {
                warn!(fd, errno, "close rejected");
                errno
            }
        };
        let _ = response.send(result);
    }

    fn handle_event(&mut self, event: IoEvent) {
        match event {
            IoEvent::ReadComplete {
                fd,
                session,
                bytes_read,
                data,
                response,
            } => {
                trace!(fd, bytes = bytes_read, "read completed");
                self.files.restore(fd, session);
                let _ = response.send((bytes_read, data));
            }
            IoEvent::WriteComplete {
                fd,
                session,
                bytes_written,
                response,
            } => {
                trace!(fd, bytes = bytes_written, "write completed");
                self.files.restore(fd, session);
                let _ = response.send(bytes_written);
            }
            IoEvent::SeekComplete {
                fd,
                session,
                position,
                response,
            } => {
                trace!(fd, position, "seek completed");
                self.files.restore(fd, session);
                let _ = response.send(position);
            }
            IoEvent::IoctlComplete {
                fd,
                session,
                result,
                arg,
                response,
            } => {
                trace!(fd, result, "ioctl completed");
                self.files.restore(fd, session);
                let _ = response.send((result, arg));
            }
        }
    }
}

/// Caller side of a [`DeviceRuntime`]
///
/// Methods mirror the POSIX calls a user-space program would make. A closed
/// runtime makes every call fail with `-EBADF`.
#[derive(Clone)]
pub struct DeviceClient {
    tx: mpsc::UnboundedSender<IoRequest>,
}

impl DeviceClient {
    async fn call<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> IoRequest,
        closed: T,
    ) -> T {
        let (response, rx) = oneshot::channel();
        if self.tx.send(request(response)).is_err() {
            return closed;
        }
        rx.await.unwrap_or(closed)
    }

    /// Open the device; returns a new fd
    pub async fn open(&self) -> c_int {
        self.call(|response| IoRequest::Open { response }, -EBADF).await
    }

    /// Read into `buf`; returns the byte count or a negated errno
    pub async fn read(&self, fd: c_int, buf: &mut [u8]) -> isize {
        let len = buf.len();
        let (n, data) = self
            .call(
                |response| IoRequest::Read { fd, len, response },
                (-EBADF as isize, Vec::new()),
            )
            .await;
        buf[..data.len()].copy_from_slice(&data);
        n
    }

    /// Write `data`; returns the byte count or a negated errno
    pub async fn write(&self, fd: c_int, data: &[u8]) -> isize {
        let data = data.to_vec();
        self.call(
            |response| IoRequest::Write { fd, data, response },
            -EBADF as isize,
        )
        .await
    }

    /// Reposition the cursor; returns the new offset or a negated errno
    pub async fn lseek(&self, fd: c_int, pos: SeekFrom) -> i64 {
        self.call(
            |response| IoRequest::Seek { fd, pos, response },
            i64::from(-EBADF),
        )
        .await
    }

    /// Run a control command
    ///
    /// `arg` is read for commands that take input and overwritten for
    /// commands that produce output. `None` behaves like a null pointer.
    pub async fn ioctl(&self, fd: c_int, command: u32, arg: Option<&mut i32>) -> c_int {
        let value = arg.as_deref().copied();
        let (result, out) = self
            .call(
                |response| IoRequest::Ioctl {
                    fd,
                    command,
                    arg: value,
                    response,
                },
                (-EBADF, value),
            )
            .await;
        if let (Some(slot), Some(out)) = (arg, out) {
            *slot = out;
        }
        result
    }

    /// Interrupt whatever the session behind `fd` is waiting for
    pub async fn interrupt(&self, fd: c_int) -> c_int {
        self.call(|response| IoRequest::Interrupt { fd, response }, -EBADF)
            .await
    }

    pub async fn close(&self, fd: c_int) -> c_int {
        self.call(|response| IoRequest::Close { fd, response }, -EBADF)
            .await
    }
}
