use crate::{
    Result,
    constants::{
        MAX_ACTUATOR_INDEX, MAX_CHANNELS, MAX_TAG_LENGTH, MIN_ACTUATOR_INDEX, MIN_TAG_LENGTH,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use subtle::ConstantTimeEq;

/// Multiplexer channel (0-7), bound to exactly one tag reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Channel(u8);

impl Channel {
    /// Create a new channel with validation.
    ///
    /// # Errors
    /// Returns `Error::ChannelOutOfRange` if the channel is not below `MAX_CHANNELS`.
    pub fn new(channel: u8) -> Result<Self> {
        if channel >= MAX_CHANNELS {
            return Err(Error::ChannelOutOfRange(channel));
        }
        Ok(Channel(channel))
    }

    /// Get the raw channel number.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Byte written to the multiplexer control register to select this channel.
    ///
    /// ```
    /// use holdfast_core::Channel;
    ///
    /// assert_eq!(Channel::new(0).unwrap().select_mask(), 0b0000_0001);
    /// assert_eq!(Channel::new(7).unwrap().select_mask(), 0b1000_0000);
    /// ```
    #[must_use]
    pub fn select_mask(&self) -> u8 {
        1 << self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Channel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Channel::new(value)
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

/// Identifier read from a transponder (4-10 bytes).
///
/// # Security
/// Comparison runs in constant time, the same way credential numbers are
/// compared elsewhere in the stack.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Tag(Vec<u8>);

impl Tag {
    /// Create a new tag with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidTag` if the length is outside 4-10 bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        let len = bytes.len();
        if !(MIN_TAG_LENGTH..=MAX_TAG_LENGTH).contains(&len) {
            return Err(Error::InvalidTag(format!(
                "Tag must be {MIN_TAG_LENGTH}-{MAX_TAG_LENGTH} bytes, got {len}"
            )));
        }
        Ok(Tag(bytes))
    }

    /// Parse a tag from a hexadecimal string such as `"A74B7EF2"`.
    ///
    /// Separators (`:`, `-`, spaces) between byte pairs are ignored.
    ///
    /// ```
    /// use holdfast_core::Tag;
    ///
    /// let tag = Tag::from_hex("a7:4b:7e:f2").unwrap();
    /// assert_eq!(tag.as_bytes(), &[0xA7, 0x4B, 0x7E, 0xF2]);
    /// assert!(Tag::from_hex("A74").is_err());
    /// ```
    ///
    /// # Errors
    /// Returns `Error::InvalidTag` for odd-length or non-hex input.
    pub fn from_hex(text: &str) -> Result<Self> {
        let digits: String = text
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | ' '))
            .collect();

        if digits.len() % 2 != 0 {
            return Err(Error::InvalidTag(format!("Odd number of hex digits: {text}")));
        }

        let bytes = (0..digits.len())
            .step_by(2)
            .map(|i| {
                digits
                    .get(i..i + 2)
                    .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                    .ok_or_else(|| Error::InvalidTag(format!("Not a hex tag: {text}")))
            })
            .collect::<Result<Vec<u8>>>()?;

        Tag::new(bytes)
    }

    /// Get the raw tag bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Format the tag as uppercase hexadecimal.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02X}")).collect()
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

impl Hash for Tag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for Tag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Tag::from_hex(s)
    }
}

impl TryFrom<Vec<u8>> for Tag {
    type Error = Error;

    fn try_from(value: Vec<u8>) -> Result<Self> {
        Tag::new(value)
    }
}

impl From<Tag> for Vec<u8> {
    fn from(tag: Tag) -> Self {
        tag.0
    }
}

/// Outcome of comparing one raw scan against a part's expected tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    /// Nothing in the reader's field (or the read failed this cycle).
    Absent,

    /// A tag was read but it belongs to some other part.
    Wrong(Tag),

    /// The expected tag was read.
    Matching,
}

impl ScanResult {
    /// Classify a raw reading against the expected tag.
    ///
    /// ```
    /// use holdfast_core::{ScanResult, Tag};
    ///
    /// let expected = Tag::new(vec![1, 2, 3, 4]).unwrap();
    /// let other = Tag::new(vec![9, 9, 9, 9]).unwrap();
    ///
    /// assert_eq!(ScanResult::classify(None, &expected), ScanResult::Absent);
    /// assert_eq!(ScanResult::classify(Some(&expected), &expected), ScanResult::Matching);
    /// assert_eq!(
    ///     ScanResult::classify(Some(&other), &expected),
    ///     ScanResult::Wrong(other.clone())
    /// );
    /// ```
    #[must_use]
    pub fn classify(raw: Option<&Tag>, expected: &Tag) -> Self {
        match raw {
            None => ScanResult::Absent,
            Some(tag) if tag == expected => ScanResult::Matching,
            Some(tag) => ScanResult::Wrong(tag.clone()),
        }
    }

    /// Check if this result is the expected tag.
    #[must_use]
    pub fn is_matching(&self) -> bool {
        matches!(self, ScanResult::Matching)
    }
}

/// Address of one actuator output: driver board I2C address plus output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActuatorAddress {
    /// I2C address of the driver board.
    pub controller: u8,

    /// Output index on the board (1-4).
    pub index: u8,
}

impl ActuatorAddress {
    /// Create a new actuator address with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidActuator` if the index is outside 1-4.
    pub fn new(controller: u8, index: u8) -> Result<Self> {
        let address = ActuatorAddress { controller, index };
        address.validate()?;
        Ok(address)
    }

    /// Check the output index range.
    ///
    /// # Errors
    /// Returns `Error::InvalidActuator` if the index is outside 1-4.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_ACTUATOR_INDEX..=MAX_ACTUATOR_INDEX).contains(&self.index) {
            return Err(Error::InvalidActuator(format!(
                "Output index must be {MIN_ACTUATOR_INDEX}-{MAX_ACTUATOR_INDEX}, got {} on 0x{:02X}",
                self.index, self.controller
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ActuatorAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:02X}/{}", self.controller, self.index)
    }
}

/// Part status as reported to the dashboard side-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartStatus {
    /// Part not in place; actuators off.
    Missing,

    /// Part in place; actuators energized.
    Present,

    /// Some other part's tag is in this slot.
    WrongTag,

    /// Part is about to be dropped.
    Releasing,
}

impl fmt::Display for PartStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            PartStatus::Missing => "missing",
            PartStatus::Present => "present",
            PartStatus::WrongTag => "wrong_tag",
            PartStatus::Releasing => "releasing",
        };
        write!(f, "{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0b0000_0001)]
    #[case(3, 0b0000_1000)]
    #[case(7, 0b1000_0000)]
    fn test_channel_select_mask(#[case] channel: u8, #[case] mask: u8) {
        assert_eq!(Channel::new(channel).unwrap().select_mask(), mask);
    }

    #[test]
    fn test_channel_out_of_range() {
        assert_eq!(Channel::new(8), Err(Error::ChannelOutOfRange(8)));
        assert!(Channel::try_from(255).is_err());
    }

    #[test]
    fn test_channel_deserialize_validates() {
        let channel: Channel = serde_json::from_str("5").unwrap();
        assert_eq!(channel.as_u8(), 5);
        assert!(serde_json::from_str::<Channel>("9").is_err());
    }

    #[rstest]
    #[case(vec![1, 2, 3])]
    #[case(vec![0; 11])]
    #[case(vec![])]
    fn test_tag_invalid_length(#[case] bytes: Vec<u8>) {
        assert!(matches!(Tag::new(bytes), Err(Error::InvalidTag(_))));
    }

    #[test]
    fn test_tag_equality_is_exact() {
        let a = Tag::new(vec![167, 75, 126, 242]).unwrap();
        let b = Tag::new(vec![167, 75, 126, 242]).unwrap();
        let prefix = Tag::new(vec![167, 75, 126, 242, 0]).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, prefix);
    }

    #[test]
    fn test_tag_hex_roundtrip_display() {
        let tag = Tag::new(vec![0x37, 0xA7, 0x80, 0xF2]).unwrap();
        assert_eq!(tag.to_string(), "37A780F2");
        assert_eq!("37A780F2".parse::<Tag>().unwrap(), tag);
    }

    #[test]
    fn test_tag_from_hex_rejects_garbage() {
        assert!(Tag::from_hex("ZZ4B7EF2").is_err());
        assert!(Tag::from_hex("").is_err());
    }

    #[test]
    fn test_tag_deserializes_from_byte_array() {
        let tag: Tag = serde_json::from_str("[167, 75, 126, 242]").unwrap();
        assert_eq!(tag.as_bytes(), &[167, 75, 126, 242]);
        assert!(serde_json::from_str::<Tag>("[1, 2]").is_err());
    }

    #[test]
    fn test_scan_result_classify() {
        let expected = Tag::new(vec![1, 2, 3, 4]).unwrap();
        let other = Tag::new(vec![4, 3, 2, 1]).unwrap();

        assert_eq!(ScanResult::classify(None, &expected), ScanResult::Absent);
        assert!(ScanResult::classify(Some(&expected), &expected).is_matching());
        assert_eq!(
            ScanResult::classify(Some(&other), &expected),
            ScanResult::Wrong(other)
        );
    }

    #[rstest]
    #[case(0)]
    #[case(5)]
    fn test_actuator_address_invalid_index(#[case] index: u8) {
        assert!(ActuatorAddress::new(0x60, index).is_err());
    }

    #[test]
    fn test_actuator_address_display() {
        let address = ActuatorAddress::new(0x61, 2).unwrap();
        assert_eq!(address.to_string(), "0x61/2");
    }

    #[test]
    fn test_part_status_serialization() {
        let json = serde_json::to_string(&PartStatus::WrongTag).unwrap();
        assert_eq!(json, "\"wrong_tag\"");
        assert_eq!(PartStatus::Present.to_string(), "present");
    }
}
