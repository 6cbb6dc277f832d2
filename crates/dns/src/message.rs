use std::{
    fmt::{Display, Formatter},
    net::{Ipv4Addr, Ipv6Addr},
};

use anyhow::ensure;
use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{
    domain_name::DomainName,
    reader::{DnsMessageReader, DnsReadable},
    u16_enum_with_unknown,
    writer::{DnsMessageWriter, DnsWritable},
};

/// Size of the fixed message header.
pub const HEADER_LEN: usize = 12;

/// Largest response a plain (non-EDNS) UDP client accepts.
pub const MAX_UDP_PAYLOAD: usize = 512;

/// A decoded DNS message.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsMessage {
    /// Transaction id
    pub id: u16,
    pub flags: DnsFlags,
    questions: Vec<DnsQuestion>,
    answers: Vec<DnsRecord>,
    authority_records: Vec<DnsRecord>,
    additional_records: Vec<DnsRecord>,
}

impl DnsMessage {
    pub fn new(
        id: u16,
        flags: DnsFlags,
        questions: Vec<DnsQuestion>,
        answers: Vec<DnsRecord>,
        authority_records: Vec<DnsRecord>,
        additional_records: Vec<DnsRecord>,
    ) -> Self {
        Self {
            id,
            flags,
            questions,
            answers,
            authority_records,
            additional_records,
        }
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        let mut reader = DnsMessageReader::new(data);

        let id = reader.read_u16()?;
        let flags = DnsFlags::read_from(&mut reader)?;

        let qdcount = reader.read_u16()?;
        let ancount = reader.read_u16()?;
        let nscount = reader.read_u16()?;
        let arcount = reader.read_u16()?;

        let questions = (0..qdcount)
            .map(|_| DnsQuestion::read_from(&mut reader))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let answers = read_records(&mut reader, ancount)?;
        let authority_records = read_records(&mut reader, nscount)?;
        let additional_records = read_records(&mut reader, arcount)?;

        Ok(Self {
            id,
            flags,
            questions,
            answers,
            authority_records,
            additional_records,
        })
    }

    pub fn encode(&self) -> anyhow::Result<Bytes> {
        let mut writer = DnsMessageWriter::new();

        writer.write_u16(self.id)?;
        self.flags.write_to(&mut writer)?;

        writer.write_u16(section_len(self.questions.len())?)?;
        writer.write_u16(section_len(self.answers.len())?)?;
        writer.write_u16(section_len(self.authority_records.len())?)?;
        writer.write_u16(section_len(self.additional_records.len())?)?;

        for question in &self.questions {
            question.write_to(&mut writer)?;
        }

        for record in self
            .answers
            .iter()
            .chain(&self.authority_records)
            .chain(&self.additional_records)
        {
            record.write_to(&mut writer)?;
        }

        Ok(writer.into_bytes())
    }

    pub fn questions(&self) -> &[DnsQuestion] {
        &self.questions
    }

    pub fn answers(&self) -> &[DnsRecord] {
        &self.answers
    }

    pub fn authority_records(&self) -> &[DnsRecord] {
        &self.authority_records
    }

    pub fn additional_records(&self) -> &[DnsRecord] {
        &self.additional_records
    }

    pub fn response_code(&self) -> anyhow::Result<DnsResponseCode> {
        Ok(DnsResponseCode::try_from(self.flags.rcode)?)
    }

    /// Header and question only, with TC set.
    ///
    /// Sent over UDP in place of a response that does not fit the datagram so
    /// the client retries over TCP.
    pub fn truncated(&self) -> Self {
        Self {
            id: self.id,
            flags: DnsFlags {
                truncated: true,
                ..self.flags
            },
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority_records: Vec::new(),
            additional_records: Vec::new(),
        }
    }
}

fn read_records(reader: &mut DnsMessageReader, count: u16) -> anyhow::Result<Vec<DnsRecord>> {
    (0..count).map(|_| DnsRecord::read_from(reader)).collect()
}

fn section_len(len: usize) -> anyhow::Result<u16> {
    u16::try_from(len).map_err(|_| anyhow::anyhow!("too many records in section: {}", len))
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DnsFlags {
    /// QR: set on responses
    pub response: bool,
    pub opcode: DnsOpcode,
    pub authoritative_answer: bool,
    /// TC: the message was cut to fit the transport
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    /// Reserved, must be zero.
    pub z: bool,
    pub authentic_data: bool,
    pub checking_disabled: bool,
    /// Low four bits of the response code.
    pub rcode: u8,
}

impl DnsReadable for DnsFlags {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        let bits = reader.read_u16()?;
        Ok(Self {
            response: (bits >> 15) & 0x1 != 0,
            opcode: DnsOpcode::try_from(((bits >> 11) & 0xF) as u8)?,
            authoritative_answer: (bits >> 10) & 0x1 != 0,
            truncated: (bits >> 9) & 0x1 != 0,
            recursion_desired: (bits >> 8) & 0x1 != 0,
            recursion_available: (bits >> 7) & 0x1 != 0,
            z: (bits >> 6) & 0x1 != 0,
            authentic_data: (bits >> 5) & 0x1 != 0,
            checking_disabled: (bits >> 4) & 0x1 != 0,
            rcode: (bits & 0x0F) as u8,
        })
    }
}

impl DnsWritable for DnsFlags {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        let opcode: u8 = self.opcode.into();
        writer.write_u16(
            ((self.response as u16) << 15)
                | ((opcode as u16 & 0xF) << 11)
                | ((self.authoritative_answer as u16) << 10)
                | ((self.truncated as u16) << 9)
                | ((self.recursion_desired as u16) << 8)
                | ((self.recursion_available as u16) << 7)
                | ((self.z as u16) << 6)
                | ((self.authentic_data as u16) << 5)
                | ((self.checking_disabled as u16) << 4)
                | (self.rcode as u16 & 0x0F),
        )
    }
}

/// Header response codes (RFC 1035, RFC 2136).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DnsResponseCode {
    #[default]
    NoError = 0,
    FormatError = 1,
    ServerFailure = 2,
    /// The queried name does not exist
    NxDomain = 3,
    NotImp = 4,
    Refused = 5,
    YXDomain = 6,
    YXRRSet = 7,
    NXRRSet = 8,
    NotAuth = 9,
    NotZone = 10,
}

impl Display for DnsResponseCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NoError => "NOERROR",
            Self::FormatError => "FORMERR",
            Self::ServerFailure => "SERVFAIL",
            Self::NxDomain => "NXDOMAIN",
            Self::NotImp => "NOTIMP",
            Self::Refused => "REFUSED",
            Self::YXDomain => "YXDOMAIN",
            Self::YXRRSet => "YXRRSET",
            Self::NXRRSet => "NXRRSET",
            Self::NotAuth => "NOTAUTH",
            Self::NotZone => "NOTZONE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DnsOpcode {
    #[default]
    Query = 0,
    /// Obsolete
    IQuery = 1,
    Status = 2,
    Notify = 4,
    Update = 5,
    /// DNS stateful operations (RFC 8490)
    Dso = 6,
}

u16_enum_with_unknown! {
    /// Resource record types this crate knows by name.
    pub enum RecordType {
        A = 1,
        NS = 2,
        CNAME = 5,
        SOA = 6,
        PTR = 12,
        HINFO = 13,
        MX = 15,
        TXT = 16,
        AAAA = 28,
        SRV = 33,
        NAPTR = 35,
        DNAME = 39,
        /// EDNS pseudo record, additional section only
        OPT = 41,
        DS = 43,
        RRSIG = 46,
        NSEC = 47,
        DNSKEY = 48,
        SVCB = 64,
        HTTPS = 65,
        ANY = 255,
        CAA = 257,
    }
}

u16_enum_with_unknown! {
    /// Record classes.
    pub enum ClassType {
        /// Internet
        IN = 1,
        /// Chaosnet
        CH = 3,
        /// Hesiod
        HS = 4,
        NONE = 254,
        ANY = 255,
    }
}

/// A question section entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub qname: DomainName,
    pub qtype: RecordType,
    pub qclass: ClassType,
}

impl DnsQuestion {
    pub fn new(qname: DomainName, qtype: RecordType, qclass: ClassType) -> Self {
        Self { qname, qtype, qclass }
    }
}

impl DnsReadable for DnsQuestion {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        let qname = reader.read_qname()?;
        let qtype = RecordType::from(reader.read_u16()?);
        let qclass = ClassType::from(reader.read_u16()?);
        Ok(Self { qname, qtype, qclass })
    }
}

impl DnsWritable for DnsQuestion {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        writer.write_qname(&self.qname)?;
        writer.write_u16(self.qtype.into())?;
        writer.write_u16(self.qclass.into())?;
        Ok(())
    }
}

impl Display for DnsQuestion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}\t{}", self.qname.fqdn(), self.qclass, self.qtype)
    }
}

/// Record data.
///
/// Types whose rdata embeds names are parsed so that compression pointers are
/// resolved and the record can be written into a different message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsRecordData {
    Raw(Vec<u8>),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    DomainName(DomainName),
    SOA {
        mname: DomainName,
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    MX {
        priority: u16,
        host: DomainName,
    },
    SRV {
        priority: u16,
        weight: u16,
        port: u16,
        target: DomainName,
    },
}

impl DnsRecordData {
    pub fn write(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        match self {
            Self::Raw(data) => writer.write_bytes(data),
            Self::Ipv4(addr) => writer.write_bytes(&addr.octets()),
            Self::Ipv6(addr) => writer.write_bytes(&addr.octets()),
            Self::DomainName(name) => writer.write_qname(name),
            Self::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                writer.write_qname(mname)?;
                writer.write_qname(rname)?;
                for v in [serial, refresh, retry, expire, minimum] {
                    writer.write_u32(*v)?;
                }
                Ok(())
            }
            Self::MX { priority, host } => {
                writer.write_u16(*priority)?;
                writer.write_qname(host)
            }
            Self::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                writer.write_u16(*priority)?;
                writer.write_u16(*weight)?;
                writer.write_u16(*port)?;
                writer.write_qname(target)
            }
        }
    }

    /// Decode `data_length` bytes of rdata for `record_type`.
    pub fn read_from_record_type(
        reader: &mut DnsMessageReader,
        record_type: RecordType,
        data_length: usize,
    ) -> anyhow::Result<Self> {
        let start = reader.position();

        let data = match record_type {
            RecordType::A => {
                ensure!(data_length == 4, "A record with rdlength {}", data_length);
                let b = reader.read_bytes(4)?;
                Self::Ipv4(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
            }
            RecordType::AAAA => {
                ensure!(data_length == 16, "AAAA record with rdlength {}", data_length);
                let mut octets = [0u8; 16];
                octets.copy_from_slice(reader.read_bytes(16)?);
                Self::Ipv6(Ipv6Addr::from(octets))
            }
            RecordType::CNAME | RecordType::NS | RecordType::PTR | RecordType::DNAME => {
                Self::DomainName(reader.read_qname()?)
            }
            RecordType::SOA => Self::SOA {
                mname: reader.read_qname()?,
                rname: reader.read_qname()?,
                serial: reader.read_u32()?,
                refresh: reader.read_u32()?,
                retry: reader.read_u32()?,
                expire: reader.read_u32()?,
                minimum: reader.read_u32()?,
            },
            RecordType::MX => Self::MX {
                priority: reader.read_u16()?,
                host: reader.read_qname()?,
            },
            RecordType::SRV => Self::SRV {
                priority: reader.read_u16()?,
                weight: reader.read_u16()?,
                port: reader.read_u16()?,
                target: reader.read_qname()?,
            },
            _ => Self::Raw(reader.read_bytes(data_length)?.to_vec()),
        };

        let consumed = reader.position() - start;
        ensure!(
            consumed == data_length,
            "{} rdata consumed {} bytes, rdlength is {}",
            record_type,
            consumed,
            data_length
        );

        Ok(data)
    }
}

impl Display for DnsRecordData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw(data) => write!(f, "\\# {}", data.len()),
            Self::Ipv4(addr) => write!(f, "{}", addr),
            Self::Ipv6(addr) => write!(f, "{}", addr),
            Self::DomainName(name) => f.write_str(&name.fqdn()),
            Self::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => write!(
                f,
                "{} {} {} {} {} {} {}",
                mname.fqdn(),
                rname.fqdn(),
                serial,
                refresh,
                retry,
                expire,
                minimum
            ),
            Self::MX { priority, host } => write!(f, "{} {}", priority, host.fqdn()),
            Self::SRV {
                priority,
                weight,
                port,
                target,
            } => write!(f, "{} {} {} {}", priority, weight, port, target.fqdn()),
        }
    }
}

/// A resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: DomainName,
    pub record_type: RecordType,
    pub class: ClassType,
    pub ttl: u32,
    pub data: DnsRecordData,
}

impl DnsRecord {
    pub fn new(
        name: DomainName,
        record_type: RecordType,
        class: ClassType,
        ttl: u32,
        data: DnsRecordData,
    ) -> Self {
        Self {
            name,
            record_type,
            class,
            ttl,
            data,
        }
    }
}

impl DnsReadable for DnsRecord {
    fn read_from(reader: &mut DnsMessageReader) -> anyhow::Result<Self> {
        let name = reader.read_qname()?;
        let record_type = RecordType::from(reader.read_u16()?);
        // For OPT this is the requestor's payload size; keep it verbatim.
        let class = ClassType::from(reader.read_u16()?);
        let ttl = reader.read_u32()?;
        let data_length = reader.read_u16()? as usize;

        let data = DnsRecordData::read_from_record_type(reader, record_type, data_length)?;

        Ok(Self {
            name,
            record_type,
            class,
            ttl,
            data,
        })
    }
}

impl DnsWritable for DnsRecord {
    fn write_to(&self, writer: &mut DnsMessageWriter) -> anyhow::Result<()> {
        writer.write_qname(&self.name)?;
        writer.write_u16(self.record_type.into())?;
        writer.write_u16(self.class.into())?;
        writer.write_u32(self.ttl)?;

        let rdlen_pos = writer.position();
        writer.write_u16(0)?;

        let before = writer.position();
        self.data.write(writer)?;
        let rdlen = u16::try_from(writer.position() - before)?;

        writer.overwrite_bytes(rdlen_pos, &rdlen.to_be_bytes())
    }
}

impl Display for DnsRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.name.fqdn(),
            self.ttl,
            self.class,
            self.record_type,
            self.data
        )
    }
}
