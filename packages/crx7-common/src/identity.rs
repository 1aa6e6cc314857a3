use serde::Serialize;
use sha2::{Digest, Sha256};

/// A display identity assigned to a candidate wallet for the wheel UI
/// and the public winner history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub emoji: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

impl Identity {
    /// Display form used in winner records, e.g. "🐻 BEAR".
    pub fn display(&self) -> String {
        format!("{} {}", self.emoji, self.name)
    }
}

/// Crypto meme community animals used as wallet display identities.
pub const IDENTITY_CATALOG: [Identity; 12] = [
    Identity { emoji: "🐶", name: "DOGE", description: "The original crypto dog" },
    Identity { emoji: "🐸", name: "PEPE", description: "Rare Pepe the Frog" },
    Identity { emoji: "🐱", name: "CAT", description: "Meme cat vibes" },
    Identity { emoji: "🦊", name: "FOX", description: "MetaMask fox energy" },
    Identity { emoji: "🐻", name: "BEAR", description: "Bear market survivor" },
    Identity { emoji: "🐂", name: "BULL", description: "Bull run champion" },
    Identity { emoji: "🦍", name: "APE", description: "Diamond hands ape" },
    Identity { emoji: "🐺", name: "WOLF", description: "Wolf of Crypto Street" },
    Identity { emoji: "🦁", name: "LION", description: "King of the jungle" },
    Identity { emoji: "🐢", name: "TURTLE", description: "Slow and steady HODLer" },
    Identity { emoji: "🦄", name: "UNICORN", description: "Mythical gains" },
    Identity { emoji: "🐙", name: "OCTOPUS", description: "Eight-armed trader" },
];

/// Canonical identity assignment: `sha256(address)`, first 8 bytes as
/// a big-endian integer, modulo the catalog size. The same wallet
/// address resolves to the same identity on every code path, which is
/// what makes the wheel legend and the persisted winner history agree.
pub fn identity_for_wallet(wallet_address: &str) -> &'static Identity {
    let digest: [u8; 32] = Sha256::digest(wallet_address.as_bytes()).into();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[0..8]);
    let index = (u64::from_be_bytes(prefix) % IDENTITY_CATALOG.len() as u64) as usize;
    &IDENTITY_CATALOG[index]
}

/// Shortened wallet display, e.g. "7xKX...gAsU". Counts characters,
/// not bytes, so an address with multibyte characters never splits a
/// character.
pub fn short_address(address: &str) -> String {
    let count = address.chars().count();
    if count <= 8 {
        return address.to_string();
    }
    let head: String = address.chars().take(4).collect();
    let tail: String = address.chars().skip(count - 4).collect();
    format!("{head}...{tail}")
}
