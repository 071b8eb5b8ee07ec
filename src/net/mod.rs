pub mod bus;
pub mod message;

pub use bus::{Bus, BusHandle, TimerId};
pub use message::{Message, MinerRef, ParticipantId, ProofFound};
