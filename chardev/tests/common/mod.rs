//! Helpers shared by the integration tests

use std::sync::{mpsc, Arc, Mutex};

use chardev::{BufferManager, CopyFault, DeviceError, UserSlice};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Write source that parks inside the caller copy until released
///
/// While parked, the writing session holds the device lock.
pub struct GatedSrc {
    data: Vec<u8>,
    entered: Arc<Notify>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl UserSlice for GatedSrc {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), CopyFault> {
        self.entered.notify_one();
        let _ = self.release.lock().unwrap().recv();
        dst.copy_from_slice(&self.data[..dst.len()]);
        Ok(())
    }
}

/// Start a write of `data` that holds the device lock until the returned
/// sender fires
///
/// Needs a multi-threaded runtime: the parked copy blocks its worker.
pub async fn hold_lock(
    device: &Arc<BufferManager>,
    data: &[u8],
) -> (JoinHandle<Result<usize, DeviceError>>, mpsc::Sender<()>) {
    let entered = Arc::new(Notify::new());
    let (release_tx, release_rx) = mpsc::channel();
    let src = GatedSrc {
        data: data.to_vec(),
        entered: Arc::clone(&entered),
        release: Mutex::new(release_rx),
    };

    let mut holder = device.open();
    let task = tokio::spawn(async move { holder.write(&src).await });
    entered.notified().await;
    (task, release_tx)
}
