//! Single byte commands sent by the host over the serial link

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Handshake; answered with `Ready`
    Ping,
    /// Run one feed cycle
    Feed,
}

impl Command {
    /// Decode a received byte. Letters are matched in either case; anything else is `None`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte.to_ascii_uppercase() {
            b'H' => Some(Self::Ping),
            b'F' => Some(Self::Feed),
            _ => None,
        }
    }
}
