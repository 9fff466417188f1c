//! Command line of `chardev-cli`

use chardev::DEFAULT_CAPACITY;
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Run every scenario and exit
    Auto,
    /// Show a menu on stdin/stdout
    Interactive,
}

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "chardev-cli",
    version,
    about = "Scenario runner for the shared buffer device"
)]
pub struct Args {
    /// Run mode
    #[arg(value_enum, default_value_t = Mode::Interactive)]
    pub mode: Mode,

    /// Device capacity in bytes
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn args(list: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("chardev-cli").chain(list.iter().copied()))
    }

    #[test]
    fn test_defaults_to_interactive() {
        let parsed = args(&[]).unwrap();
        assert_eq!(parsed.mode, Mode::Interactive);
        assert_eq!(parsed.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_auto_with_capacity() {
        let parsed = args(&["auto", "--capacity", "64"]).unwrap();
        assert_eq!(parsed.mode, Mode::Auto);
        assert_eq!(parsed.capacity, 64);

        let parsed = args(&["--capacity=128"]).unwrap();
        assert_eq!(parsed.mode, Mode::Interactive);
        assert_eq!(parsed.capacity, 128);
    }

    #[test]
    fn test_bad_arguments() {
        assert!(args(&["--capacity"]).is_err());
        assert_eq!(
            args(&["--capacity", "lots"]).unwrap_err().kind(),
            ErrorKind::ValueValidation
        );
        assert_eq!(
            args(&["manual"]).unwrap_err().kind(),
            ErrorKind::InvalidValue
        );
        assert_eq!(
            args(&["--verbose"]).unwrap_err().kind(),
            ErrorKind::UnknownArgument
        );
    }

    #[test]
    fn test_command_is_well_formed() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
