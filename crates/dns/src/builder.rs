use super::message::{DnsFlags, DnsMessage, DnsOpcode, DnsQuestion, DnsRecord, DnsResponseCode};

/// Builder
#[derive(Debug, Clone, Default)]
pub struct DnsMessageBuilder {
    id: u16,
    flags: DnsFlags,
    questions: Vec<DnsQuestion>,
    answers: Vec<DnsRecord>,
    response_code: Option<DnsResponseCode>,
}

impl DnsMessageBuilder {
    /// Create a builder for a recursive query.
    pub fn new() -> Self {
        Self {
            flags: DnsFlags {
                opcode: DnsOpcode::Query,
                recursion_desired: true,
                ..DnsFlags::default()
            },
            ..Self::default()
        }
    }

    /// Start a response to `query`.
    ///
    /// Copies the id, opcode, RD and CD bits and the first question, and
    /// marks the message as a recursion-capable response.
    pub fn reply_to(query: &DnsMessage) -> Self {
        Self {
            id: query.id,
            flags: DnsFlags {
                response: true,
                opcode: query.flags.opcode,
                recursion_desired: query.flags.recursion_desired,
                recursion_available: true,
                checking_disabled: query.flags.checking_disabled,
                ..DnsFlags::default()
            },
            questions: query.questions().iter().take(1).cloned().collect(),
            ..Self::default()
        }
    }

    /// Set the ID for the DNS packet.
    pub fn with_id(mut self, id: u16) -> Self {
        self.id = id;
        self
    }

    /// Set the flags for the DNS packet.
    pub fn with_flags(mut self, flags: DnsFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Add a question to the DNS packet.
    pub fn add_question(mut self, question: DnsQuestion) -> Self {
        self.questions.push(question);
        self
    }

    /// Add an answer to the DNS packet.
    pub fn add_answer(mut self, answer: DnsRecord) -> Self {
        self.answers.push(answer);
        self
    }

    /// Mark the message as a response carrying `response_code`.
    pub fn with_response(mut self, response_code: DnsResponseCode) -> Self {
        self.response_code = Some(response_code);
        self
    }

    pub fn build(self) -> DnsMessage {
        let flags = if let Some(rcode) = self.response_code {
            let mut f = self.flags;
            f.response = true;
            f.rcode = rcode.into();
            f
        } else {
            self.flags
        };

        DnsMessage::new(
            self.id,
            flags,
            self.questions,
            self.answers,
            Vec::new(),
            Vec::new(),
        )
    }
}
