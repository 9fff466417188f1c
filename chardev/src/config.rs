use crate::error::DeviceError;

pub const DEFAULT_NAME: &str = "chardev";
pub const DEFAULT_CAPACITY: usize = 1024;

/// Settings for one device instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Name used in log messages
    pub name: String,
    /// Fixed buffer capacity in bytes
    pub capacity: usize,
}

impl DeviceConfig {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Check the settings before a device is built from them
    ///
    /// The capacity must be non-zero and small enough for `GET_SIZE` to
    /// report any used length as an `i32`.
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.capacity == 0 {
            return Err(DeviceError::InvalidConfig(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if i32::try_from(self.capacity).is_err() {
            return Err(DeviceError::InvalidConfig(format!(
                "capacity {} does not fit the size reported by GET_SIZE",
                self.capacity
            )));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DeviceConfig::default();
        assert_eq!(config.name, "chardev");
        assert_eq!(config.capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = DeviceConfig::with_capacity(0).validate();
        assert!(matches!(result, Err(DeviceError::InvalidConfig(_))));
    }

    #[test]
    fn test_oversized_capacity_rejected() {
        let too_big = usize::try_from(i32::MAX).unwrap() + 1;
        let result = DeviceConfig::with_capacity(too_big).validate();
        assert!(matches!(result, Err(DeviceError::InvalidConfig(_))));
    }
}
