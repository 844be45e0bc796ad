#[cfg(test)]
pub(crate) mod test_utils;

mod buf;
mod dns_header;
mod question;

pub use buf::{ByteBuf, EncodeToBuf, FromBuf, MAX_LABEL_LENGTH, MAX_QNAME_JUMPS, MAX_QNAME_LENGTH};
pub use dns_header::{DnsHeader, QueryOpcode, ResponseCode, DNS_HEADER_SIZE};
pub use question::{QueryType, Question};

use anyhow::Context;

/// Internet class
pub const IN_CLASS: u16 = 1;

/// Header and question section of a DNS message.
///
/// Resource records are left undecoded: nothing downstream looks past the first question.
#[derive(Debug, PartialEq, Eq, Default, Clone)]
pub struct DnsMessage {
    pub header: DnsHeader,
    pub questions: Vec<Question>,
}

impl DnsMessage {
    pub fn new() -> Self {
        DnsMessage::default()
    }

    pub fn first_question(&self) -> Option<&Question> {
        self.questions.first()
    }
}

impl FromBuf for DnsMessage {
    fn from_buf(buf: &mut ByteBuf<'_>) -> anyhow::Result<DnsMessage> {
        let header = DnsHeader::from_buf(buf).context("header parsing error")?;

        // A bogus count shouldn't translate into a huge allocation
        let mut questions = Vec::with_capacity((header.question_count as usize).min(4));
        for idx in 0..header.question_count {
            let question = Question::from_buf(buf)
                .with_context(|| format!("question parsing error at idx {}", idx))?;
            questions.push(question);
        }

        Ok(DnsMessage { header, questions })
    }
}

impl EncodeToBuf for DnsMessage {
    fn encode_to_buf(&self, buf: &mut ByteBuf) -> anyhow::Result<usize> {
        let mut header = self.header.clone();
        header.question_count = self
            .questions
            .len()
            .try_into()
            .context("too many questions")?;

        let mut encoded_size = header.encode_to_buf(buf).context("writing header")?;
        for (idx, question) in self.questions.iter().enumerate() {
            encoded_size += question
                .encode_to_buf(buf)
                .with_context(|| format!("writing question at idx {}", idx))?;
        }

        Ok(encoded_size)
    }
}
