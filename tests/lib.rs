//! Shared helpers for the MeritDrop integration tests.

use meritdrop_core::{Address, Profile, ScoreSet, UserRecord};

/// Build a record whose wallet encodes its id, so assertions can recover
/// the identity from either side.
pub fn record(id: u64, skills: u32, activity: u32, identity: u32) -> UserRecord {
    let mut wallet = [0u8; 20];
    wallet[12..20].copy_from_slice(&id.to_be_bytes());
    UserRecord {
        id,
        wallet: Address::new(wallet),
        scores: ScoreSet {
            skills,
            activity,
            identity,
            composite: (skills + activity + identity) / 3,
        },
        profile: Profile {
            display_name: format!("user-{id}"),
            bio: String::new(),
            location: None,
            avatar_url: String::new(),
        },
    }
}

pub fn addr(byte: u8) -> Address {
    Address::new([byte; 20])
}
