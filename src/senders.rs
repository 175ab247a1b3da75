//! Sender allow-list and the inbox query built from it.

/// Immutable set of sender addresses the responder will answer.
///
/// Membership is an exact, case-sensitive match against the parsed From
/// address. Order is preserved so the generated query is stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    senders: Vec<String>,
}

impl AllowList {
    /// Build an allow-list, trimming entries and dropping empty or repeated ones.
    pub fn new<I, S>(senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for s in senders {
            let s = s.as_ref().trim();
            if !s.is_empty() && !out.iter().any(|e| e == s) {
                out.push(s.to_string());
            }
        }
        Self { senders: out }
    }

    /// Parse a comma-separated list, e.g. `a@x.com, b@y.com`.
    pub fn parse(csv: &str) -> Self {
        Self::new(csv.split(','))
    }

    pub fn contains(&self, address: &str) -> bool {
        !address.is_empty() && self.senders.iter().any(|s| s == address)
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.senders.iter().map(String::as_str)
    }

    /// Mailbox search query selecting inbox mail from any allowed sender.
    ///
    /// `in:inbox (from:a@x.com OR from:b@y.com)`
    pub fn inbox_query(&self) -> String {
        let froms: Vec<String> = self.iter().map(|s| format!("from:{s}")).collect();
        match froms.len() {
            0 => "in:inbox".to_string(),
            1 => format!("in:inbox {}", froms[0]),
            _ => format!("in:inbox ({})", froms.join(" OR ")),
        }
    }
}
