use core::fmt;

use crate::decode::{Decode, DecodeError};

/// Firmware revision reported in a universal identity reply.
///
/// The reply carries four revision bytes whose meaning is up to the manufacturer.
/// Plugins map them onto this type in [`Device::identify`](crate::device::Device::identify).
///
/// This type implements `PartialOrd`, meaning it can be compared to other
/// instances of itself.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Version {
    /// The major version
    pub major: u8,
    /// The minor version
    pub minor: u8,
    /// The build version
    pub build: u8,
    /// The beta version
    pub beta: u8,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)?;
        if self.beta != 0 {
            write!(f, "b{}", self.beta)?;
        }
        Ok(())
    }
}

impl Decode for Version {
    fn decode(data: &mut &[u8]) -> Result<Self, DecodeError> {
        let major = u8::decode(data)?;
        let minor = u8::decode(data)?;
        let build = u8::decode(data)?;
        let beta = u8::decode(data)?;

        Ok(Self {
            major,
            minor,
            build,
            beta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Version;

    #[test]
    fn display() {
        let release = Version {
            major: 1,
            minor: 3,
            build: 0,
            beta: 0,
        };
        assert_eq!(release.to_string(), "1.3.0");

        let beta = Version { beta: 2, ..release };
        assert_eq!(beta.to_string(), "1.3.0b2");
        assert!(beta > release);
    }
}
