use proptest::prelude::*;

use crate::{QueryType, Question};

prop_compose! {
    pub fn arb_question()(qname in arb_qname(), query_type in any::<u16>().prop_map(QueryType::from), qclass: u16) -> Question {
        Question { qname, query_type, qclass }
    }
}

pub fn arb_qname() -> impl Strategy<Value = Vec<u8>> {
    proptest::string::string_regex(r"(([a-zA-Z0-9][a-zA-Z0-9-]{1,62}\.){0,2}[a-zA-Z0-9]{2,63})|")
        .expect("regex should be valid")
        .prop_map(String::into_bytes)
}
