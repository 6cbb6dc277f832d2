use crate::message::DnsOpcode;

/// Extracts the transaction ID from a raw DNS message.
pub fn extract_transaction_id(data: &[u8]) -> Option<u16> {
    if data.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([data[0], data[1]]))
}

/// Extracts the opcode, if it is one this crate knows.
pub fn extract_opcode(data: &[u8]) -> Option<DnsOpcode> {
    let byte = data.get(2)?;
    DnsOpcode::try_from((byte >> 3) & 0x0F).ok()
}

/// Whether the RD bit is set in a raw DNS message.
pub fn recursion_desired(data: &[u8]) -> bool {
    data.get(2).is_some_and(|b| b & 0x01 != 0)
}

/// Whether the TC bit is set in a raw DNS message.
pub fn is_truncated(data: &[u8]) -> bool {
    data.get(2).is_some_and(|b| b & 0x02 != 0)
}
