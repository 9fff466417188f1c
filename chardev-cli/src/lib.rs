//! Scenario runner for the shared buffer device
//!
//! Each scenario opens its own fd through a [`DeviceClient`], exercises one
//! area of the device and prints a colored report. Scenarios share the
//! device, so they run in order and rely on `RESET` where they need a clean
//! buffer.

use std::io::Write;

use chardev::error::EINVAL;
use chardev::{Command, DeviceClient, DeviceError, SeekFrom, Status};
use tracing::{debug, info};

pub mod args;

pub const COLOR_GREEN: &str = "\x1b[0;32m";
pub const COLOR_RED: &str = "\x1b[0;31m";
pub const COLOR_YELLOW: &str = "\x1b[0;33m";
pub const COLOR_BLUE: &str = "\x1b[0;34m";
pub const COLOR_RESET: &str = "\x1b[0m";

/// Message written and verified by the write/read scenario
pub const MESSAGE: &str =
    "Hello from user-space! This is a test message for the character device driver.";

const READ_BUFFER_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("{op} failed: {}", describe_errno(.op, .ret))]
    Call { op: &'static str, ret: i64 },

    #[error("verification failed: {0}")]
    Mismatch(String),

    #[error("report output failed: {0}")]
    Output(#[from] std::io::Error),
}

fn describe_errno(op: &str, ret: &i64) -> String {
    let ret = *ret;
    // EINVAL from lseek is a bad position, not a bad command
    if op == "lseek" && ret == -i64::from(EINVAL) {
        return format!("{} (errno {})", DeviceError::InvalidSeek, -ret);
    }
    match Status::from_return(ret) {
        Some(status) => format!("{status} (errno {})", -ret),
        None => format!("errno {}", -ret),
    }
}

/// Turn a POSIX-style return value into a result
fn check(op: &'static str, ret: impl Into<i64>) -> Result<i64, ScenarioError> {
    let ret = ret.into();
    if ret < 0 {
        Err(ScenarioError::Call { op, ret })
    } else {
        Ok(ret)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    OpenClose,
    WriteRead,
    Reset,
    GetSize,
    Flag,
    MultipleWrites,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Self::OpenClose,
        Self::WriteRead,
        Self::Reset,
        Self::GetSize,
        Self::Flag,
        Self::MultipleWrites,
    ];

    /// Scenario behind a menu number (1 to 6)
    #[must_use]
    pub fn from_choice(choice: u32) -> Option<Self> {
        let index = usize::try_from(choice).ok()?.checked_sub(1)?;
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn number(self) -> u32 {
        match self {
            Self::OpenClose => 1,
            Self::WriteRead => 2,
            Self::Reset => 3,
            Self::GetSize => 4,
            Self::Flag => 5,
            Self::MultipleWrites => 6,
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::OpenClose => "Open and Close Device",
            Self::WriteRead => "Write and Read Data",
            Self::Reset => "IOCTL Reset Command",
            Self::GetSize => "IOCTL Get Size Command",
            Self::Flag => "IOCTL Set/Get Flag Commands",
            Self::MultipleWrites => "Multiple Sequential Operations",
        }
    }

    /// Short label used in the menu
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::OpenClose => "Test Open/Close",
            Self::WriteRead => "Test Write/Read",
            Self::Reset => "Test IOCTL Reset",
            Self::GetSize => "Test IOCTL Get Size",
            Self::Flag => "Test IOCTL Set/Get Flag",
            Self::MultipleWrites => "Test Multiple Operations",
        }
    }
}

/// Colored report writer
pub struct Report<W: Write> {
    out: W,
}

impl<W: Write> Report<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn separator(&mut self) -> std::io::Result<()> {
        writeln!(
            self.out,
            "\n{COLOR_BLUE}========================================{COLOR_RESET}"
        )
    }

    pub fn header(&mut self, title: &str) -> std::io::Result<()> {
        self.separator()?;
        writeln!(self.out, "{COLOR_YELLOW}[TEST] {title}{COLOR_RESET}")?;
        self.separator()
    }

    pub fn success(&mut self, message: &str) -> std::io::Result<()> {
        writeln!(self.out, "{COLOR_GREEN}[✓] {message}{COLOR_RESET}")
    }

    pub fn error(&mut self, message: &str) -> std::io::Result<()> {
        writeln!(self.out, "{COLOR_RED}[✗] {message}{COLOR_RESET}")
    }

    pub fn line(&mut self, message: &str) -> std::io::Result<()> {
        writeln!(self.out, "{message}")
    }

    pub fn banner(&mut self, message: &str, color: &str) -> std::io::Result<()> {
        writeln!(self.out, "\n{color}=== {message} ==={COLOR_RESET}")
    }

    pub fn menu(&mut self) -> std::io::Result<()> {
        writeln!(
            self.out,
            "\n{COLOR_BLUE}=== Character Device Test Menu ==={COLOR_RESET}"
        )?;
        for scenario in Scenario::ALL {
            writeln!(self.out, "{}. {}", scenario.number(), scenario.label())?;
        }
        writeln!(self.out, "7. Run All Tests")?;
        writeln!(self.out, "0. Exit")?;
        writeln!(
            self.out,
            "{COLOR_BLUE}=========================================={COLOR_RESET}"
        )?;
        write!(self.out, "Enter your choice: ")?;
        self.out.flush()
    }
}

/// Runs scenarios against one device through a client
pub struct ScenarioRunner<W: Write> {
    client: DeviceClient,
    report: Report<W>,
}

impl<W: Write> ScenarioRunner<W> {
    pub fn new(client: DeviceClient, out: W) -> Self {
        Self {
            client,
            report: Report::new(out),
        }
    }

    pub fn report(&mut self) -> &mut Report<W> {
        &mut self.report
    }

    pub fn into_output(self) -> W {
        self.report.into_inner()
    }

    /// Run one scenario and report its outcome
    ///
    /// Returns `true` if the scenario passed.
    pub async fn run(&mut self, scenario: Scenario) -> Result<bool, std::io::Error> {
        self.report
            .header(&format!("Test {}: {}", scenario.number(), scenario.title()))?;
        info!(scenario = scenario.number(), "running scenario");

        let result = match scenario {
            Scenario::OpenClose => self.open_close().await,
            Scenario::WriteRead => self.write_read().await,
            Scenario::Reset => self.reset().await,
            Scenario::GetSize => self.get_size().await,
            Scenario::Flag => self.flag().await,
            Scenario::MultipleWrites => self.multiple_writes().await,
        };

        match result {
            Ok(()) => Ok(true),
            Err(ScenarioError::Output(e)) => Err(e),
            Err(e) => {
                debug!(scenario = scenario.number(), error = %e, "scenario failed");
                self.report.error(&e.to_string())?;
                Ok(false)
            }
        }
    }

    /// Run every scenario in order; returns the number that failed
    pub async fn run_all(&mut self) -> Result<usize, std::io::Error> {
        self.report.banner("Running All Tests", COLOR_GREEN)?;
        let mut failed = 0;
        for scenario in Scenario::ALL {
            if !self.run(scenario).await? {
                failed += 1;
            }
        }
        if failed == 0 {
            self.report.banner("All Tests Completed", COLOR_GREEN)?;
        } else {
            self.report
                .banner(&format!("{failed} Test(s) Failed"), COLOR_RED)?;
        }
        Ok(failed)
    }

    async fn open(&mut self) -> Result<i32, ScenarioError> {
        let fd = self.client.open().await;
        check("open", fd)?;
        Ok(fd)
    }

    /// Write all of `data`, treating a short write as a failure
    async fn write_exact(&mut self, fd: i32, data: &[u8]) -> Result<(), ScenarioError> {
        let n = check("write", self.client.write(fd, data).await as i64)?;
        if n != data.len() as i64 {
            return Err(ScenarioError::Mismatch(format!(
                "short write: {n} of {} bytes",
                data.len()
            )));
        }
        Ok(())
    }

    async fn read_from_start(&mut self, fd: i32, len: usize) -> Result<Vec<u8>, ScenarioError> {
        check("lseek", self.client.lseek(fd, SeekFrom::Start(0)).await)?;
        let mut buf = vec![0u8; len];
        let n = check("read", self.client.read(fd, &mut buf).await as i64)?;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        buf.truncate(n as usize);
        Ok(buf)
    }

    async fn ioctl(
        &mut self,
        fd: i32,
        command: Command,
        arg: Option<&mut i32>,
    ) -> Result<(), ScenarioError> {
        let op = match command {
            Command::Reset => "IOCTL_RESET",
            Command::GetSize => "IOCTL_GET_SIZE",
            Command::SetFlag => "IOCTL_SET_FLAG",
            Command::GetFlag => "IOCTL_GET_FLAG",
        };
        check(op, self.client.ioctl(fd, command.id(), arg).await)?;
        Ok(())
    }

    async fn close(&mut self, fd: i32) -> Result<(), ScenarioError> {
        check("close", self.client.close(fd).await)?;
        Ok(())
    }

    async fn open_close(&mut self) -> Result<(), ScenarioError> {
        let fd = self.open().await?;
        self.report.success("Device opened successfully")?;
        self.close(fd).await?;
        self.report.success("Device closed successfully")?;
        Ok(())
    }

    async fn write_read(&mut self) -> Result<(), ScenarioError> {
        let fd = self.open().await?;
        self.report.line(&format!("Writing: \"{MESSAGE}\""))?;
        self.write_exact(fd, MESSAGE.as_bytes()).await?;
        self.report
            .line(&format!("Bytes written: {}", MESSAGE.len()))?;
        self.report.success("Write operation successful")?;

        let data = self.read_from_start(fd, READ_BUFFER_SIZE).await?;
        let text = String::from_utf8_lossy(&data);
        self.report.line(&format!("Bytes read: {}", data.len()))?;
        self.report.line(&format!("Read data: \"{text}\""))?;
        self.close(fd).await?;

        if data != MESSAGE.as_bytes() {
            return Err(ScenarioError::Mismatch(
                "Read does not match Write".to_string(),
            ));
        }
        self.report
            .success("Data verification successful - Read matches Write")?;
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), ScenarioError> {
        let fd = self.open().await?;
        self.write_exact(fd, b"Test data before reset").await?;
        self.report.success("Wrote test data to device")?;

        self.ioctl(fd, Command::Reset, None).await?;
        self.report.success("IOCTL_RESET executed successfully")?;

        let data = self.read_from_start(fd, 10).await?;
        self.report
            .line(&format!("Bytes read after reset: {}", data.len()))?;
        self.close(fd).await?;

        if !data.is_empty() {
            return Err(ScenarioError::Mismatch(format!(
                "{} bytes left after reset",
                data.len()
            )));
        }
        self.report.success("Buffer is empty after reset")?;
        Ok(())
    }

    async fn get_size(&mut self) -> Result<(), ScenarioError> {
        let text = b"Testing buffer size calculation";

        let fd = self.open().await?;
        self.ioctl(fd, Command::Reset, None).await?;
        self.write_exact(fd, text).await?;
        self.report
            .line(&format!("Wrote {} bytes to device", text.len()))?;

        let mut size = 0;
        self.ioctl(fd, Command::GetSize, Some(&mut size)).await?;
        self.report
            .line(&format!("Buffer size returned: {size} bytes"))?;
        self.close(fd).await?;

        if usize::try_from(size).ok() != Some(text.len()) {
            return Err(ScenarioError::Mismatch(format!(
                "Buffer size ({size}) differs from written data ({})",
                text.len()
            )));
        }
        self.report
            .success("Buffer size matches written data size")?;
        Ok(())
    }

    async fn flag(&mut self) -> Result<(), ScenarioError> {
        let mut set_flag = 42;
        let mut get_flag = 0;

        let fd = self.open().await?;
        self.report
            .line(&format!("Setting flag to: {set_flag}"))?;
        self.ioctl(fd, Command::SetFlag, Some(&mut set_flag)).await?;
        self.report
            .success("IOCTL_SET_FLAG executed successfully")?;

        self.ioctl(fd, Command::GetFlag, Some(&mut get_flag)).await?;
        self.report
            .line(&format!("Flag value returned: {get_flag}"))?;
        self.close(fd).await?;

        if get_flag != set_flag {
            return Err(ScenarioError::Mismatch("Flag value mismatch".to_string()));
        }
        self.report
            .success("Flag value matches - Set/Get operation successful")?;
        Ok(())
    }

    async fn multiple_writes(&mut self) -> Result<(), ScenarioError> {
        let first = "First write operation";
        let second = " - Second write operation";

        let fd = self.open().await?;
        self.ioctl(fd, Command::Reset, None).await?;
        self.report.success("Device reset")?;

        // RESET leaves the cursor where it was; a fresh fd starts at 0
        self.write_exact(fd, first.as_bytes()).await?;
        self.report
            .line(&format!("First write: {} bytes", first.len()))?;
        self.write_exact(fd, second.as_bytes()).await?;
        self.report
            .line(&format!("Second write: {} bytes", second.len()))?;

        let data = self.read_from_start(fd, READ_BUFFER_SIZE).await?;
        let text = String::from_utf8_lossy(&data);
        self.report
            .line(&format!("Total bytes read: {}", data.len()))?;
        self.report.line(&format!("Data read: \"{text}\""))?;
        self.close(fd).await?;

        if text != format!("{first}{second}") {
            return Err(ScenarioError::Mismatch(
                "Data read does not match both writes".to_string(),
            ));
        }
        self.report
            .success("Multiple operations completed successfully")?;
        Ok(())
    }
}
