mod macros;

pub mod builder;
pub mod domain_name;
pub mod helpers;
pub mod message;
pub mod reader;
pub mod writer;

pub use builder::DnsMessageBuilder;
pub use domain_name::DomainName;
pub use message::{
    ClassType, DnsFlags, DnsMessage, DnsOpcode, DnsQuestion, DnsRecord, DnsRecordData, DnsResponseCode, RecordType,
    HEADER_LEN, MAX_UDP_PAYLOAD,
};

pub use reader::DnsMessageReader;
pub use writer::{DnsMessageWriter, MAX_MESSAGE_LEN};
