use crate::{ByteBuf, EncodeToBuf, FromBuf, IN_CLASS};
use anyhow::Context;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QueryType {
    UNKNOWN(u16),
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    OPT,
    HTTPS,
    ANY,
}

impl From<u16> for QueryType {
    fn from(value: u16) -> Self {
        match value {
            1 => QueryType::A,
            2 => QueryType::NS,
            5 => QueryType::CNAME,
            6 => QueryType::SOA,
            12 => QueryType::PTR,
            15 => QueryType::MX,
            16 => QueryType::TXT,
            28 => QueryType::AAAA,
            33 => QueryType::SRV,
            41 => QueryType::OPT,
            65 => QueryType::HTTPS,
            255 => QueryType::ANY,
            _ => QueryType::UNKNOWN(value),
        }
    }
}

impl From<QueryType> for u16 {
    fn from(val: QueryType) -> Self {
        match val {
            QueryType::A => 1,
            QueryType::NS => 2,
            QueryType::CNAME => 5,
            QueryType::SOA => 6,
            QueryType::PTR => 12,
            QueryType::MX => 15,
            QueryType::TXT => 16,
            QueryType::AAAA => 28,
            QueryType::SRV => 33,
            QueryType::OPT => 41,
            QueryType::HTTPS => 65,
            QueryType::ANY => 255,
            QueryType::UNKNOWN(qtype) => qtype,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Question {
    /// Dotted QNAME exactly as it appears on the wire
    pub qname: Vec<u8>,
    pub query_type: QueryType,
    pub qclass: u16,
}

impl Question {
    pub fn new(qname: impl Into<Vec<u8>>, query_type: QueryType, qclass: Option<u16>) -> Self {
        Self {
            qname: qname.into(),
            query_type,
            qclass: qclass.unwrap_or(IN_CLASS),
        }
    }
}

impl FromBuf for Question {
    fn from_buf(buf: &mut ByteBuf) -> anyhow::Result<Question> {
        let qname = buf.read_qname().context("QNAME is missing")?;
        let qtype_raw = buf.read_u16().context("QTYPE is missing")?;
        let class = buf.read_u16().context("QCLASS is missing")?;

        Ok(Question {
            qname,
            query_type: qtype_raw.into(),
            qclass: class,
        })
    }
}

impl EncodeToBuf for Question {
    fn encode_to_buf(&self, buf: &mut ByteBuf) -> anyhow::Result<usize> {
        let qname_size = buf.write_qname(&self.qname).context("writing QNAME")?;
        buf.write_u16(self.query_type.into());
        buf.write_u16(self.qclass);

        Ok(qname_size + 2 /* QTYPE */ + 2 /* CLASS */)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::arb_question;
    use proptest::prelude::*;

    #[test]
    fn question_parsing() {
        let data = &[
            0x7, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, 0x3, 0x63, 0x6f, 0x6d, 0x0, 0x0, 0x1c, 0x0,
            0x1,
        ];
        let mut buf = ByteBuf::new(data);
        let question = Question::from_buf(&mut buf).expect("shouldn't have failed");

        assert_eq!(question.qname, b"example.com");
        assert_eq!(question.query_type, QueryType::AAAA);
        assert_eq!(question.qclass, IN_CLASS);
    }

    #[test]
    #[should_panic(expected = "QCLASS is missing")]
    fn question_without_class() {
        let data = &[0x1, 0x61, 0x0, 0x0, 0x1];
        let mut buf = ByteBuf::new(data);
        Question::from_buf(&mut buf).unwrap();
    }

    proptest! {
        #[test]
        fn question_roundtrip(question in arb_question()) {
            let mut buf = ByteBuf::new_empty(None);
            let encoded_size = question.encode_to_buf(&mut buf).expect("shouldn't have failed");
            prop_assert_eq!(encoded_size, buf.len());
            let roundtripped_question = Question::from_buf(&mut buf).expect("shouldn't have failed");
            prop_assert_eq!(question, roundtripped_question, "Question roundtrip test failed");
        }
    }
}
