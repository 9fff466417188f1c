//! Shared buffer demo
//!
//! Lines typed on stdin are written to the device by one session; three more
//! sessions then read the buffer back, each with its own cursor.
//! Set `RUST_LOG=info` to see the device log.

use chardev::{BufferManager, DeviceConfig, Session};
use embedded_io_async::Read;
use std::io::{self, BufRead};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let device = BufferManager::new(DeviceConfig::default())?;

    let lines = tokio::task::spawn_blocking(|| {
        println!("Enter text (empty line to quit):");
        io::stdin()
            .lock()
            .lines()
            .map_while(Result::ok)
            .take_while(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
    })
    .await?;

    let mut writer = device.open();
    for line in &lines {
        let mut data = line.trim().as_bytes().to_vec();
        data.push(b'\n');
        match writer.write(&data[..]).await {
            Ok(n) if n < data.len() => {
                println!("short write: {n} of {} bytes, device is full", data.len());
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("write error: {e}");
                break;
            }
        }
    }
    writer.close();

    let mut tasks = Vec::new();
    for name in ["r1", "r2", "r3"] {
        let mut reader = device.open();
        tasks.push(tokio::spawn(async move {
            read_all(name, &mut reader).await;
        }));
    }
    for task in tasks {
        task.await?;
    }

    println!("All tasks completed");
    Ok(())
}

async fn read_all(name: &str, reader: &mut Session) {
    let mut buf = [0u8; 16];
    let mut total = 0;
    loop {
        match Read::read(reader, &mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                total += n;
                println!("{name}: {:?}", String::from_utf8_lossy(&buf[..n]));
            }
            Err(e) => {
                eprintln!("{name}: read error: {e}");
                break;
            }
        }
    }
    println!("{name}: end of data after {total} bytes");
}
