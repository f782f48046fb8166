use crate::pattern::Bindings;
use clasp_types::FactId;
use std::fmt;

/// Identifier of a registered pattern
pub type PatternId = u64;

/// Identifier of a registered join
pub type JoinId = u64;

/// A (partial) match: the facts matched so far, in pattern order, with their
/// combined variable bindings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub fact_ids: Vec<FactId>,
    pub bindings: Bindings,
}

impl Token {
    /// Create a new token with a single fact ID
    pub fn new(fact_id: FactId, bindings: Bindings) -> Self {
        Self { fact_ids: vec![fact_id], bindings }
    }

    /// Extend this token with one more fact, if the bindings are consistent
    pub fn join(&self, fact_id: FactId, bindings: &Bindings) -> Option<Self> {
        let bindings = self.bindings.merge(bindings)?;
        let mut fact_ids = Vec::with_capacity(self.fact_ids.len() + 1);
        fact_ids.extend_from_slice(&self.fact_ids);
        fact_ids.push(fact_id);
        Some(Self { fact_ids, bindings })
    }

    pub fn contains(&self, fact_id: FactId) -> bool {
        self.fact_ids.contains(&fact_id)
    }

    /// First fact of the token
    pub fn fact_id(&self) -> FactId {
        self.fact_ids[0]
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.fact_ids.iter().map(|id| format!("f-{id}")).collect();
        write!(f, "[{}] {}", ids.join(","), self.bindings)
    }
}

/// Which matcher node produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchSource {
    Pattern(PatternId),
    Join(JoinId),
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchSource::Pattern(id) => write!(f, "pattern-{id}"),
            MatchSource::Join(id) => write!(f, "join-{id}"),
        }
    }
}

/// Change to a match set, for an external agenda
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    Added { source: MatchSource, token: Token },
    Removed { source: MatchSource, token: Token },
}

impl MatchEvent {
    pub fn source(&self) -> MatchSource {
        match self {
            MatchEvent::Added { source, .. } | MatchEvent::Removed { source, .. } => *source,
        }
    }

    pub fn token(&self) -> &Token {
        match self {
            MatchEvent::Added { token, .. } | MatchEvent::Removed { token, .. } => token,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, MatchEvent::Added { .. })
    }
}

impl fmt::Display for MatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_added() { "+" } else { "-" };
        write!(f, "{sign} {} {}", self.source(), self.token())
    }
}
