//! Caller memory
//!
//! The device never touches caller memory directly. Reads copy out through
//! [`UserSliceMut`], writes copy in through [`UserSlice`], and control
//! commands move their integer argument through [`UserArg`]. Any of them may
//! report a [`CopyFault`] when the memory behind them is not accessible.

/// Caller memory could not be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("caller memory is not accessible")]
pub struct CopyFault;

/// Destination of a read
pub trait UserSliceMut {
    /// Number of bytes the caller is ready to receive
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `src` to the start of the caller memory.
    ///
    /// `src.len()` never exceeds `self.len()`.
    fn copy_to_user(&mut self, src: &[u8]) -> Result<(), CopyFault>;
}

/// Source of a write
pub trait UserSlice {
    /// Number of bytes the caller offers
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `dst` from the start of the caller memory.
    ///
    /// `dst.len()` never exceeds `self.len()`.
    fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), CopyFault>;
}

/// In/out integer argument of a control command
pub trait UserArg {
    fn read_arg(&self) -> Result<i32, CopyFault>;

    fn write_arg(&mut self, value: i32) -> Result<(), CopyFault>;
}

impl UserSliceMut for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_to_user(&mut self, src: &[u8]) -> Result<(), CopyFault> {
        self.get_mut(..src.len())
            .ok_or(CopyFault)?
            .copy_from_slice(src);
        Ok(())
    }
}

impl UserSlice for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), CopyFault> {
        dst.copy_from_slice(self.get(..dst.len()).ok_or(CopyFault)?);
        Ok(())
    }
}

impl UserArg for i32 {
    fn read_arg(&self) -> Result<i32, CopyFault> {
        Ok(*self)
    }

    fn write_arg(&mut self, value: i32) -> Result<(), CopyFault> {
        *self = value;
        Ok(())
    }
}

/// `None` plays the part of a null argument pointer: every access faults.
impl UserArg for Option<i32> {
    fn read_arg(&self) -> Result<i32, CopyFault> {
        self.ok_or(CopyFault)
    }

    fn write_arg(&mut self, value: i32) -> Result<(), CopyFault> {
        match self {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(CopyFault),
        }
    }
}
