use uuid::Uuid;

/// A candidate in an election, read-only to this service.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The unique identifier for the candidate.
    pub id: Uuid,
    /// The election the candidate runs in.
    pub election_id: Uuid,
    /// The candidate's display name.
    pub name: String,
}
