use uuid::Uuid;

use crate::transaction::Transaction;

/// Identity of a registered participant.
pub type ParticipantId = Uuid;

/// Who produced a block, and the eligibility fingerprint it claimed for the cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinerRef {
    pub id: ParticipantId,
    pub name: String,
    pub eligibility: String,
}

/// Payload of [`Message::ProofFound`].
#[derive(Debug, Clone)]
pub struct ProofFound {
    /// Serialized block, pending transactions included.
    pub block: Vec<u8>,
    /// Unnamed announcements skip the eligibility check.
    pub miner: Option<MinerRef>,
}

/// Everything a participant's mailbox can receive.
#[derive(Debug, Clone)]
pub enum Message {
    InitMinting { reuse_reward_address: bool },
    StartMining,
    ProofFound(ProofFound),
    PostTransaction(Transaction),
}

impl Message {
    pub fn name(&self) -> &'static str {
        match self {
            Message::InitMinting { .. } => "INIT_MINTING",
            Message::StartMining => "START_MINING",
            Message::ProofFound(_) => "PROOF_FOUND",
            Message::PostTransaction(_) => "POST_TRANSACTION",
        }
    }
}
