//! One open of the device
//!
//! A session carries its own cursor and interrupt signal plus a shared
//! handle to the device. Cursors are never shared, so two sessions reading
//! the same device do not disturb each other.

use std::fmt;
use std::sync::Arc;

use embedded_io::SeekFrom;

use crate::device::{BufferManager, Command};
use crate::error::DeviceError;
use crate::idgen::Handle;
use crate::interrupt::Interrupter;
use crate::io::{UserArg, UserSlice, UserSliceMut};

/// Session on a shared [`BufferManager`]
///
/// # Thread Safety
///
/// - **Independent cursors**: each session moves only its own offset. Many
///   sessions can run operations concurrently; the device lock serializes
///   them.
/// - **NOT shareable for I/O**: `read()`, `write()` and `seek()` take
///   `&mut self`, so one session is driven by one task at a time. Use
///   [`Session::interrupter`] to reach a session that is blocked elsewhere.
pub struct Session {
    handle: Handle,
    device: Arc<BufferManager>,
    offset: u64,
    interrupter: Interrupter,
}

impl Session {
    pub(crate) fn new(handle: Handle, device: Arc<BufferManager>) -> Self {
        Self {
            handle,
            device,
            offset: 0,
            interrupter: Interrupter::new(),
        }
    }

    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Current cursor position
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn device(&self) -> &Arc<BufferManager> {
        &self.device
    }

    /// Handle for interrupting this session's lock waits from another task
    #[must_use]
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Read up to `dst.len()` bytes at the cursor and advance it
    ///
    /// Returns `Ok(0)` when the cursor is at or past the used length.
    pub async fn read<B: UserSliceMut + ?Sized>(
        &mut self,
        dst: &mut B,
    ) -> Result<usize, DeviceError> {
        self.device
            .read_at(self.handle, &mut self.offset, dst, &self.interrupter)
            .await
    }

    /// Write at the cursor and advance it
    ///
    /// A write that hits the capacity is cut short and returns fewer bytes
    /// than offered. A write with the cursor already at the capacity fails
    /// with [`DeviceError::NoSpace`].
    pub async fn write<B: UserSlice + ?Sized>(&mut self, src: &B) -> Result<usize, DeviceError> {
        self.device
            .write_at(self.handle, &mut self.offset, src, &self.interrupter)
            .await
    }

    /// Run a control command by its numeric id
    pub async fn control<A: UserArg + ?Sized>(
        &self,
        command: u32,
        arg: &mut A,
    ) -> Result<(), DeviceError> {
        self.device
            .control(self.handle, command, arg, &self.interrupter)
            .await
    }

    /// `RESET`: clear the buffer and the flag
    ///
    /// Cursors of open sessions, this one included, are left where they are.
    pub async fn reset(&self) -> Result<(), DeviceError> {
        let mut unused: i32 = 0;
        self.control(Command::Reset.id(), &mut unused).await
    }

    /// `GET_SIZE`: the used length
    pub async fn size(&self) -> Result<i32, DeviceError> {
        let mut size: i32 = 0;
        self.control(Command::GetSize.id(), &mut size).await?;
        Ok(size)
    }

    /// `SET_FLAG`
    pub async fn set_flag(&self, value: i32) -> Result<(), DeviceError> {
        let mut value = value;
        self.control(Command::SetFlag.id(), &mut value).await
    }

    /// `GET_FLAG`
    pub async fn flag(&self) -> Result<i32, DeviceError> {
        let mut value: i32 = 0;
        self.control(Command::GetFlag.id(), &mut value).await?;
        Ok(value)
    }

    /// Move the cursor
    ///
    /// `End` is relative to the used length, which is read under the device
    /// lock. Positions past the used length or the capacity are allowed.
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64, DeviceError> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.offset.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let used = self.device.used_len(&self.interrupter).await?;
                (used as u64).checked_add_signed(delta)
            }
        };
        self.offset = target.ok_or(DeviceError::InvalidSeek)?;
        Ok(self.offset)
    }

    /// Close the session; device state is not affected
    pub fn close(self) {
        drop(self);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Session(handle={}, offset={}, interrupted={}, device={})",
            self.handle,
            self.offset,
            self.interrupter.is_raised(),
            self.device.name()
        )
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        log::info!("{}: device closed ({})", self.device.name(), self.handle);
    }
}

impl embedded_io::ErrorType for Session {
    type Error = DeviceError;
}

impl embedded_io_async::Read for Session {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Session::read(self, buf).await
    }
}

impl embedded_io_async::Write for Session {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Session::write(self, buf).await
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io_async::Seek for Session {
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, Self::Error> {
        Session::seek(self, pos).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    #[tokio::test]
    async fn test_open_starts_at_zero() {
        let device = BufferManager::new(DeviceConfig::default()).unwrap();
        let first = device.open();
        let second = device.open();

        assert_eq!(first.offset(), 0);
        assert_ne!(first.handle(), second.handle());
    }

    #[tokio::test]
    async fn test_seek_variants() {
        let device = BufferManager::new(DeviceConfig::with_capacity(16)).unwrap();
        let mut session = device.open();
        session.write(&b"0123456789"[..]).await.unwrap();

        assert_eq!(session.seek(SeekFrom::Start(2)).await, Ok(2));
        assert_eq!(session.seek(SeekFrom::Current(3)).await, Ok(5));
        assert_eq!(session.seek(SeekFrom::End(-4)).await, Ok(6));
        assert_eq!(session.seek(SeekFrom::End(100)).await, Ok(110));
    }

    #[tokio::test]
    async fn test_seek_before_start_is_rejected() {
        let device = BufferManager::new(DeviceConfig::default()).unwrap();
        let mut session = device.open();
        session.seek(SeekFrom::Start(3)).await.unwrap();

        assert_eq!(
            session.seek(SeekFrom::Current(-4)).await,
            Err(DeviceError::InvalidSeek)
        );
        assert_eq!(session.offset(), 3);
        assert_eq!(
            session.seek(SeekFrom::End(-1)).await,
            Err(DeviceError::InvalidSeek)
        );
    }

    #[tokio::test]
    async fn test_typed_controls() {
        let device = BufferManager::new(DeviceConfig::default()).unwrap();
        let mut session = device.open();

        session.write(&b"abc"[..]).await.unwrap();
        session.set_flag(-7).await.unwrap();
        assert_eq!(session.size().await, Ok(3));
        assert_eq!(session.flag().await, Ok(-7));

        session.reset().await.unwrap();
        assert_eq!(session.size().await, Ok(0));
        assert_eq!(session.flag().await, Ok(0));
        // Reset leaves the cursor alone
        assert_eq!(session.offset(), 3);
    }
}
