// Length limits for configured strings.
//
// The device keeps the broker endpoint and topics in fixed-capacity buffers.
// This file has no imports so the firmware build script can include it with
// `#[path]` and reject over-long configuration before anything is flashed.

/// Longest topic name the device can publish to.
pub const TOPIC_CAPACITY: usize = 64;

/// Longest broker host name.
pub const HOST_CAPACITY: usize = 64;

/// Longest MQTT client identifier.
pub const CLIENT_ID_CAPACITY: usize = 32;

/// A configured string that is longer than its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TooLong {
    pub field: &'static str,
    pub len: usize,
    pub capacity: usize,
}

impl core::fmt::Display for TooLong {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} is {} bytes long, at most {} fit",
            self.field, self.len, self.capacity
        )
    }
}

/// Check that `value` fits into a buffer of `capacity` bytes.
pub fn check_len(field: &'static str, value: &str, capacity: usize) -> Result<(), TooLong> {
    if value.len() > capacity {
        return Err(TooLong {
            field,
            len: value.len(),
            capacity,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_check_len_at_capacity() {
        let topic = "t".repeat(TOPIC_CAPACITY);
        assert_eq!(check_len("topic", &topic, TOPIC_CAPACITY), Ok(()));
        assert_eq!(check_len("client id", "", CLIENT_ID_CAPACITY), Ok(()));
    }

    #[test]
    fn test_check_len_over_capacity() {
        let host = "h".repeat(HOST_CAPACITY + 1);
        let err = check_len("HYGROLINK_BROKER_HOST", &host, HOST_CAPACITY).unwrap_err();

        assert_eq!(
            err,
            TooLong {
                field: "HYGROLINK_BROKER_HOST",
                len: HOST_CAPACITY + 1,
                capacity: HOST_CAPACITY,
            }
        );
        assert_eq!(
            err.to_string(),
            "HYGROLINK_BROKER_HOST is 65 bytes long, at most 64 fit"
        );
    }
}
