//! Shared buffer manager
//!
//! One fixed-capacity buffer, its logical length and a flag word, all behind
//! a single lock. Sessions call in with their own cursor; the manager never
//! stores cursors.
//!
//! # Locking
//!
//! Every operation takes the whole-device lock, does its work and releases
//! it on every exit path (the guard is dropped on return). The copy to or
//! from caller memory happens while the lock is held, so at most one
//! transfer is in progress at any time.
//!
//! Waiting for the lock can be interrupted through the session's
//! [`Interrupter`]. An interrupted call returns [`DeviceError::Interrupted`]
//! before it has touched any state. Once the lock is acquired the operation
//! always runs to completion.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::config::DeviceConfig;
use crate::error::DeviceError;
use crate::idgen::{Handle, IdGen};
use crate::interrupt::Interrupter;
use crate::io::{BoundedBuffer, UserArg, UserSlice, UserSliceMut};
use crate::session::Session;

/// Control commands with their stable numeric ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    /// Zero the storage, set used length and flag to 0
    Reset = 1,
    /// Report the used length (out argument)
    GetSize = 2,
    /// Store the argument as the flag (in argument)
    SetFlag = 3,
    /// Report the flag (out argument)
    GetFlag = 4,
}

impl Command {
    #[must_use]
    pub const fn id(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for Command {
    type Error = DeviceError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(Self::Reset),
            2 => Ok(Self::GetSize),
            3 => Ok(Self::SetFlag),
            4 => Ok(Self::GetFlag),
            other => Err(DeviceError::InvalidCommand(other)),
        }
    }
}

/// State guarded by the device lock
struct DeviceState {
    buffer: BoundedBuffer,
    flag: i32,
}

/// The shared buffer device
///
/// Built once through [`BufferManager::new`] and shared as `Arc<BufferManager>`
/// by every session and by the dispatch runtime. The device is torn down when
/// the last handle is dropped.
///
/// # Example
///
/// ```
/// use chardev::{BufferManager, DeviceConfig};
///
/// # tokio_test_block_on(async {
/// let device = BufferManager::new(DeviceConfig::default()).unwrap();
/// let mut session = device.open();
///
/// assert_eq!(session.write(&b"hello"[..]).await.unwrap(), 5);
/// assert_eq!(session.size().await.unwrap(), 5);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct BufferManager {
    name: String,
    capacity: usize,
    state: Mutex<DeviceState>,
    ids: IdGen,
}

impl BufferManager {
    /// Create the device with zeroed storage, used length 0 and flag 0
    pub fn new(config: DeviceConfig) -> Result<Arc<Self>, DeviceError> {
        config.validate()?;
        log::info!(
            "{}: initializing device, capacity {} bytes",
            config.name,
            config.capacity
        );

        Ok(Arc::new(Self {
            capacity: config.capacity,
            state: Mutex::new(DeviceState {
                buffer: BoundedBuffer::new(config.capacity),
                flag: 0,
            }),
            name: config.name,
            ids: IdGen::new(),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Open a new session with its cursor at 0
    ///
    /// Does not take the lock and cannot fail.
    #[must_use]
    pub fn open(self: &Arc<Self>) -> Session {
        let handle = self.ids.next_handle();
        log::info!("{}: device opened ({handle})", self.name);
        Session::new(handle, Arc::clone(self))
    }

    /// Copy of the valid region of the buffer
    ///
    /// Waits for the lock without the possibility of interruption.
    pub async fn contents(&self) -> Vec<u8> {
        self.state.lock().await.buffer.as_slice().to_vec()
    }

    /// Acquire the device lock unless interrupted first
    ///
    /// A signal that is already pending interrupts the call without touching
    /// the lock. If the lock and a signal become ready together, the lock
    /// wins and the signal stays pending for the next call.
    async fn lock(
        &self,
        interrupter: &Interrupter,
    ) -> Result<MutexGuard<'_, DeviceState>, DeviceError> {
        if interrupter.take() {
            return Err(DeviceError::Interrupted);
        }
        tokio::select! {
            biased;
            guard = self.state.lock() => Ok(guard),
            () = interrupter.raised() => {
                interrupter.take();
                Err(DeviceError::Interrupted)
            }
        }
    }

    pub(crate) async fn read_at<B: UserSliceMut + ?Sized>(
        &self,
        handle: Handle,
        offset: &mut u64,
        dst: &mut B,
        interrupter: &Interrupter,
    ) -> Result<usize, DeviceError> {
        let state = self.lock(interrupter).await?;

        let chunk = state.buffer.readable_at(*offset, dst.len());
        if chunk.is_empty() {
            return Ok(0);
        }
        dst.copy_to_user(chunk)?;

        let n = chunk.len();
        *offset += n as u64;
        log::debug!("{}: read {n} bytes from device ({handle})", self.name);
        Ok(n)
    }

    pub(crate) async fn write_at<B: UserSlice + ?Sized>(
        &self,
        handle: Handle,
        offset: &mut u64,
        src: &B,
        interrupter: &Interrupter,
    ) -> Result<usize, DeviceError> {
        let mut state = self.lock(interrupter).await?;

        let window = state
            .buffer
            .window_mut(*offset, src.len())
            .ok_or(DeviceError::NoSpace)?;

        // A fault part way through the caller copy must not reach the storage.
        let mut staged = vec![0u8; window.len()];
        src.copy_from_user(&mut staged)?;
        window.copy_from_slice(&staged);

        let n = staged.len();
        // `window_mut` succeeded, so the offset is below the capacity.
        #[allow(clippy::cast_possible_truncation)]
        let end = *offset as usize + n;
        state.buffer.extend_to(end);
        *offset += n as u64;

        log::debug!("{}: wrote {n} bytes to device ({handle})", self.name);
        Ok(n)
    }

    pub(crate) async fn control<A: UserArg + ?Sized>(
        &self,
        handle: Handle,
        command: u32,
        arg: &mut A,
        interrupter: &Interrupter,
    ) -> Result<(), DeviceError> {
        let mut state = self.lock(interrupter).await?;

        let command = match Command::try_from(command) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("{}: invalid control command {command} ({handle})", self.name);
                return Err(e);
            }
        };

        match command {
            Command::Reset => {
                state.buffer.clear();
                state.flag = 0;
                log::info!("{}: buffer reset ({handle})", self.name);
            }
            Command::GetSize => {
                let size = i32::try_from(state.buffer.len()).unwrap_or(i32::MAX);
                arg.write_arg(size)?;
                log::info!("{}: get size: {size} ({handle})", self.name);
            }
            Command::SetFlag => {
                let value = arg.read_arg()?;
                state.flag = value;
                log::info!("{}: set flag: {value} ({handle})", self.name);
            }
            Command::GetFlag => {
                arg.write_arg(state.flag)?;
                log::info!("{}: get flag: {} ({handle})", self.name, state.flag);
            }
        }
        Ok(())
    }

    pub(crate) async fn used_len(&self, interrupter: &Interrupter) -> Result<usize, DeviceError> {
        Ok(self.lock(interrupter).await?.buffer.len())
    }
}

impl fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_lock() {
            Ok(state) => write!(
                f,
                "BufferManager(name={}, capacity={}, used={}, flag={})",
                self.name,
                self.capacity,
                state.buffer.len(),
                state.flag
            ),
            Err(_) => write!(
                f,
                "BufferManager(name={}, capacity={}, locked)",
                self.name, self.capacity
            ),
        }
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        log::info!("{}: device unloaded", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids_are_stable() {
        assert_eq!(Command::Reset.id(), 1);
        assert_eq!(Command::GetSize.id(), 2);
        assert_eq!(Command::SetFlag.id(), 3);
        assert_eq!(Command::GetFlag.id(), 4);
    }

    #[test]
    fn test_command_decoding() {
        assert_eq!(Command::try_from(3), Ok(Command::SetFlag));
        assert_eq!(Command::try_from(0), Err(DeviceError::InvalidCommand(0)));
        assert_eq!(Command::try_from(5), Err(DeviceError::InvalidCommand(5)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = BufferManager::new(DeviceConfig::with_capacity(0));
        assert!(matches!(result, Err(DeviceError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_pending_interrupt_skips_lock() {
        let device = BufferManager::new(DeviceConfig::default()).unwrap();
        let interrupter = Interrupter::new();
        interrupter.raise();

        let result = device.used_len(&interrupter).await;
        assert_eq!(result, Err(DeviceError::Interrupted));
        // Consumed by the call it interrupted
        assert!(!interrupter.is_raised());
        assert_eq!(device.used_len(&interrupter).await, Ok(0));
    }

    #[tokio::test]
    async fn test_debug_reports_state() {
        let device = BufferManager::new(DeviceConfig::with_capacity(16)).unwrap();
        assert_eq!(
            format!("{device:?}"),
            "BufferManager(name=chardev, capacity=16, used=0, flag=0)"
        );
    }
}
