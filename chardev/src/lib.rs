pub mod config;
pub mod device;
pub mod error;
pub mod idgen;
pub mod interrupt;
pub mod io;
pub mod runtime;
pub mod session;

// Re-export device types for convenience
pub use config::{DeviceConfig, DEFAULT_CAPACITY};
pub use device::{BufferManager, Command};
pub use session::Session;

// Re-export error types for convenience
pub use error::{DeviceError, Status};

// Re-export idgen types for convenience
pub use idgen::{Handle, IdGen};

// Re-export I/O building blocks
pub use interrupt::Interrupter;
pub use io::{BoundedBuffer, CopyFault, UserArg, UserSlice, UserSliceMut};

// Re-export dispatch runtime types
pub use runtime::{DeviceClient, DeviceRuntime, FdTable, IoEvent, IoFuture, IoRequest};

// Re-export seek positions used by sessions and clients
pub use embedded_io::SeekFrom;
