mod common;

use std::sync::Arc;
use std::time::Duration;

use chardev::{BufferManager, DeviceConfig, DeviceError, SeekFrom};
use common::hold_lock;

fn device() -> Arc<BufferManager> {
    BufferManager::new(DeviceConfig::default()).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_do_not_interleave() {
    let device = device();

    for _round in 0..20 {
        let mut tasks = Vec::new();
        for letter in b'a'..=b'h' {
            let mut session = device.open();
            tasks.push(tokio::spawn(async move {
                let block = [letter; 512];
                session.write(&block[..]).await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(512));
        }

        // Every write covered the same range, so the last one wins whole
        let contents = device.contents().await;
        assert_eq!(contents.len(), 512);
        assert!(contents.iter().all(|&b| b == contents[0]));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_fill_disjoint_ranges() {
    let device = device();

    let mut tasks = Vec::new();
    for (i, letter) in (b'a'..=b'h').enumerate() {
        let mut session = device.open();
        tasks.push(tokio::spawn(async move {
            session.seek(SeekFrom::Start(i as u64 * 100)).await.unwrap();
            session.write(&[letter; 100][..]).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), Ok(100));
    }

    let contents = device.contents().await;
    assert_eq!(contents.len(), 800);
    for (i, chunk) in contents.chunks(100).enumerate() {
        assert!(chunk.iter().all(|&b| b == b'a' + i as u8));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interrupt_aborts_blocked_read() {
    let device = device();
    let (holder, release) = hold_lock(&device, b"held").await;

    let mut blocked = device.open();
    let interrupter = blocked.interrupter();
    let waiter = tokio::spawn(async move {
        let mut buf = [0u8; 4];
        let result = blocked.read(&mut buf[..]).await;
        (result, blocked.offset())
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    interrupter.raise();
    let (result, offset) = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("interrupted read should return")
        .unwrap();
    assert_eq!(result, Err(DeviceError::Interrupted));
    assert_eq!(offset, 0);
    assert!(!interrupter.is_raised());

    release.send(()).unwrap();
    assert_eq!(holder.await.unwrap(), Ok(4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interrupted_write_has_no_effect() {
    let device = device();
    let (holder, release) = hold_lock(&device, b"held").await;

    let mut blocked = device.open();
    blocked.seek(SeekFrom::Start(2)).await.unwrap();
    let interrupter = blocked.interrupter();
    let waiter = tokio::spawn(async move {
        let result = blocked.write(&b"overwrite"[..]).await;
        (result, blocked.offset())
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    interrupter.raise();
    let (result, offset) = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("interrupted write should return")
        .unwrap();
    assert_eq!(result, Err(DeviceError::Interrupted));
    assert_eq!(offset, 2);

    release.send(()).unwrap();
    holder.await.unwrap().unwrap();
    assert_eq!(device.contents().await, b"held");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interrupted_control_has_no_effect() {
    let device = device();
    let setter = device.open();
    setter.set_flag(11).await.unwrap();

    let (holder, release) = hold_lock(&device, b"held").await;

    let resetter = device.open();
    let interrupter = resetter.interrupter();
    let waiter = tokio::spawn(async move { resetter.reset().await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    interrupter.raise();
    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("interrupted reset should return")
        .unwrap();
    assert_eq!(result, Err(DeviceError::Interrupted));

    release.send(()).unwrap();
    holder.await.unwrap().unwrap();
    assert_eq!(setter.flag().await, Ok(11));
    assert_eq!(setter.size().await, Ok(4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocked_read_proceeds_after_release() {
    let device = device();
    let (holder, release) = hold_lock(&device, b"held").await;

    let mut reader = device.open();
    let waiter = tokio::spawn(async move {
        let mut buf = [0u8; 8];
        let n = reader.read(&mut buf[..]).await?;
        Ok::<_, DeviceError>(buf[..n].to_vec())
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    release.send(()).unwrap();
    assert_eq!(holder.await.unwrap(), Ok(4));
    // The read was ordered after the write that held the lock
    assert_eq!(waiter.await.unwrap(), Ok(b"held".to_vec()));
}
