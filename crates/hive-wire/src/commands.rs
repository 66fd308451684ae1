//! Profile-wide command identifiers
//!
//! Commands a profile-wide frame may carry; the dispatcher acts on the
//! subset below and ignores everything else.

/// Read attributes request
pub const CMD_READ_ATTRIBUTES: u8 = 0x00;
/// Read attributes response
pub const CMD_READ_ATTRIBUTES_RESPONSE: u8 = 0x01;
/// Write attributes request
pub const CMD_WRITE_ATTRIBUTES: u8 = 0x02;
/// Write attributes response
pub const CMD_WRITE_ATTRIBUTES_RESPONSE: u8 = 0x04;
/// Unsolicited attribute report
pub const CMD_REPORT_ATTRIBUTES: u8 = 0x0A;
/// Default response
pub const CMD_DEFAULT_RESPONSE: u8 = 0x0B;

/// Profile-wide commands the dispatcher reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileCommand {
    ReadAttributes,
    ReadAttributesResponse,
    WriteAttributes,
    WriteAttributesResponse,
    ReportAttributes,
    DefaultResponse,
}

impl ProfileCommand {
    /// Map a raw command id; unknown ids yield `None` and are ignored upstream.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            CMD_READ_ATTRIBUTES => Some(Self::ReadAttributes),
            CMD_READ_ATTRIBUTES_RESPONSE => Some(Self::ReadAttributesResponse),
            CMD_WRITE_ATTRIBUTES => Some(Self::WriteAttributes),
            CMD_WRITE_ATTRIBUTES_RESPONSE => Some(Self::WriteAttributesResponse),
            CMD_REPORT_ATTRIBUTES => Some(Self::ReportAttributes),
            CMD_DEFAULT_RESPONSE => Some(Self::DefaultResponse),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_commands() {
        assert_eq!(ProfileCommand::from_id(0x0A), Some(ProfileCommand::ReportAttributes));
        assert_eq!(
            ProfileCommand::from_id(0x01),
            Some(ProfileCommand::ReadAttributesResponse)
        );
        assert_eq!(ProfileCommand::from_id(0x42), None);
    }
}
