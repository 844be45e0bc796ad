use anyhow::Context;

use crate::{ByteBuf, EncodeToBuf, FromBuf};

pub const DNS_HEADER_SIZE: usize = 12;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum QueryOpcode {
    /// Standard query
    #[default]
    QUERY,
    /// Inverse query
    IQUERY,
    /// Status request
    STATUS,
    /// RFC1996 zone change notification
    NOTIFY,
    /// RFC2136 dynamic update
    UPDATE,
    /// Unassigned opcodes (3, 6-15)
    UNKNOWN(#[cfg_attr(test, proptest(strategy = "prop_unassigned_opcode()"))] u8),
}

#[cfg(test)]
fn prop_unassigned_opcode() -> impl proptest::strategy::Strategy<Value = u8> {
    use proptest::prelude::*;
    prop_oneof![Just(3u8), 6..16u8]
}

impl From<u8> for QueryOpcode {
    fn from(value: u8) -> Self {
        match value {
            0 => QueryOpcode::QUERY,
            1 => QueryOpcode::IQUERY,
            2 => QueryOpcode::STATUS,
            4 => QueryOpcode::NOTIFY,
            5 => QueryOpcode::UPDATE,
            other => QueryOpcode::UNKNOWN(other),
        }
    }
}

impl From<QueryOpcode> for u8 {
    fn from(value: QueryOpcode) -> Self {
        match value {
            QueryOpcode::QUERY => 0,
            QueryOpcode::IQUERY => 1,
            QueryOpcode::STATUS => 2,
            QueryOpcode::NOTIFY => 4,
            QueryOpcode::UPDATE => 5,
            QueryOpcode::UNKNOWN(opcode) => opcode & 0xf,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum ResponseCode {
    #[default]
    Success,
    /// Server was unable to interpret the query
    FormatError,
    /// Server was unnable to process the query due to an internal error
    ServerFailure,
    /// Domain name referenced in the query doesn't exist
    NameError,
    /// Requested type of query is not supported by the server
    NotImplemented,
    /// Server refuses to complete the specified operation
    Refused,
    /// 6-15 codes
    Unknown(#[cfg_attr(test, proptest(strategy = "6..16u8"))] u8),
}

impl From<u8> for ResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ResponseCode::Success,
            1 => ResponseCode::FormatError,
            2 => ResponseCode::ServerFailure,
            3 => ResponseCode::NameError,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            other => ResponseCode::Unknown(other),
        }
    }
}

impl From<ResponseCode> for u8 {
    fn from(value: ResponseCode) -> Self {
        match value {
            ResponseCode::Success => 0,
            ResponseCode::FormatError => 1,
            ResponseCode::ServerFailure => 2,
            ResponseCode::NameError => 3,
            ResponseCode::NotImplemented => 4,
            ResponseCode::Refused => 5,
            ResponseCode::Unknown(rcode) => rcode & 0xf,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Default, Clone)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct DnsHeader {
    /// Transaction ID.
    /// A query and its response **must have the same ID**.
    pub id: u16,
    /// Query/Response
    pub is_response: bool,
    /// Kind of query
    pub opcode: QueryOpcode,
    /// Set by the server. Indicates whether a server is authoritative
    pub is_authoritative: bool,
    /// Is set if packet is larger than **512 bytes**
    pub truncation: bool,
    /// Set by the sender. Enables recursive resolution
    pub recursion_desired: bool,
    /// Set by the server. Indicate whether recursion is allowed
    pub recursion_available: bool,
    /// Used for DNSSEC
    pub z: [bool; 3],
    /// Set by the server. Indicates status of the response
    pub response_code: ResponseCode,
    /// Number of entries in the *Question* section
    pub question_count: u16,
    /// Number of entries in the *Answer* section
    pub answer_rr_count: u16,
    /// Number of entries in the *Authority* section
    pub authority_rr_count: u16,
    /// Number of entries in the *Additional* section
    pub additional_rr_count: u16,
}

impl DnsHeader {
    pub fn new() -> Self {
        DnsHeader::default()
    }

    pub fn get_flags(&self) -> u16 {
        let first_byte = (self.is_response as u8) << 7
            | u8::from(self.opcode) << 3
            | (self.is_authoritative as u8) << 2
            | (self.truncation as u8) << 1
            | self.recursion_desired as u8;
        let second_byte = (self.recursion_available as u8) << 7
            | (self.z[0] as u8) << 6
            | (self.z[1] as u8) << 5
            | (self.z[2] as u8) << 4
            | u8::from(self.response_code);
        (first_byte as u16) << 8 | (second_byte as u16)
    }
}

impl FromBuf for DnsHeader {
    fn from_buf(buf: &mut ByteBuf) -> anyhow::Result<Self> {
        let id = buf.read_u16().context("id is missing")?;
        let flags = buf.read_u16().context("flags are missing")?;

        let is_response = ((flags & 0x8000) >> 15) == 1;
        let opcode: QueryOpcode = (((flags & 0x7800) >> 11) as u8).into();
        let is_authoritative = ((flags & 0x400) >> 10) == 1;
        let truncation = ((flags & 0x200) >> 9) == 1;
        let recursion_desired = ((flags & 0x100) >> 8) == 1;
        let recursion_available = ((flags & 0x80) >> 7) == 1;
        let z = {
            let bit_1 = ((flags & 0x40) >> 6) == 1;
            let bit_2 = ((flags & 0x20) >> 5) == 1;
            let bit_3 = ((flags & 0x10) >> 4) == 1;
            [bit_1, bit_2, bit_3]
        };
        let response_code: ResponseCode = ((flags & 0xf) as u8).into();
        let question_count = buf.read_u16().context("question count is missing")?;
        let answer_rr_count = buf.read_u16().context("answer RR count is missing")?;
        let authority_rr_count = buf.read_u16().context("authority RR count is missing")?;
        let additional_rr_count = buf
            .read_u16()
            .context("additional RR count is missing")?;

        Ok(DnsHeader {
            id,
            is_response,
            opcode,
            is_authoritative,
            truncation,
            recursion_desired,
            recursion_available,
            z,
            response_code,
            question_count,
            answer_rr_count,
            authority_rr_count,
            additional_rr_count,
        })
    }
}

impl EncodeToBuf for DnsHeader {
    fn encode_to_buf(&self, buf: &mut ByteBuf) -> anyhow::Result<usize> {
        buf.write_u16(self.id);
        buf.write_u16(self.get_flags());
        buf.write_u16(self.question_count);
        buf.write_u16(self.answer_rr_count);
        buf.write_u16(self.authority_rr_count);
        buf.write_u16(self.additional_rr_count);

        Ok(DNS_HEADER_SIZE)
    }
}
