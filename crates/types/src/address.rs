//! On-chain and off-chain addressing plus the per-instance client identity.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::amount::Asset;
use crate::error::{Result, TypesError};

/// Length of an on-chain account address in bytes.
pub const CHAIN_ADDRESS_LEN: usize = 20;

/// On-chain account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainAddress(pub [u8; CHAIN_ADDRESS_LEN]);

impl ChainAddress {
    /// Derive a deterministic address from an arbitrary seed (first 20 bytes
    /// of its SHA-256). Used for local and test accounts.
    pub fn from_seed(seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        let mut bytes = [0u8; CHAIN_ADDRESS_LEN];
        bytes.copy_from_slice(&digest[..CHAIN_ADDRESS_LEN]);
        ChainAddress(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHAIN_ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for ChainAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for ChainAddress {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim_start_matches("0x");
        let decoded =
            hex::decode(raw).map_err(|e| TypesError::InvalidAddress(format!("{}: {}", s, e)))?;
        let bytes: [u8; CHAIN_ADDRESS_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            TypesError::InvalidAddress(format!(
                "{}: expected {} bytes, got {}",
                s,
                CHAIN_ADDRESS_LEN,
                v.len()
            ))
        })?;
        Ok(ChainAddress(bytes))
    }
}

/// Address identifying a client on the off-chain wire transport.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WireAddress(String);

impl WireAddress {
    pub fn new(address: impl Into<String>) -> Self {
        WireAddress(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WireAddress {
    fn from(s: &str) -> Self {
        WireAddress(s.to_string())
    }
}

impl From<ChainAddress> for WireAddress {
    fn from(address: ChainAddress) -> Self {
        WireAddress(address.to_string())
    }
}

/// Target chain network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    #[default]
    Devnet,
}

impl Network {
    /// Human-readable prefix used when displaying addresses on this network.
    pub fn address_prefix(&self) -> &'static str {
        match self {
            Network::Mainnet => "ckb",
            Network::Testnet | Network::Devnet => "ckt",
        }
    }

    /// Display form of an on-chain address for this network.
    pub fn display_address(&self, address: &ChainAddress) -> String {
        format!("{}1{}", self.address_prefix(), hex::encode(address.as_bytes()))
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Network {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "devnet" | "dev" => Ok(Network::Devnet),
            other => Err(TypesError::UnknownNetwork(other.to_string())),
        }
    }
}

/// On-chain account of the client. Signing is performed by the protocol
/// engine's wallet; the client only ever reads the address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    address: ChainAddress,
}

impl Account {
    pub fn new(address: ChainAddress) -> Self {
        Self { address }
    }

    pub fn address(&self) -> ChainAddress {
        self.address
    }
}

/// Immutable identity of one client instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Display name.
    pub name: String,
    /// On-chain account.
    pub account: Account,
    /// Off-chain wire address.
    pub wire_address: WireAddress,
    /// Target network.
    pub network: Network,
    /// Asset used for all channel balances.
    pub asset: Asset,
}

impl ClientIdentity {
    pub fn new(
        name: impl Into<String>,
        account: Account,
        wire_address: WireAddress,
        network: Network,
        asset: Asset,
    ) -> Self {
        Self {
            name: name.into(),
            account,
            wire_address,
            network,
            asset,
        }
    }

    /// Identity whose on-chain and wire addresses are both derived from the
    /// name, the way local demo accounts are set up.
    pub fn local(name: impl Into<String>, network: Network, asset: Asset) -> Self {
        let name = name.into();
        let address = ChainAddress::from_seed(&name);
        Self::new(name, Account::new(address), address.into(), network, asset)
    }

    pub fn display_address(&self) -> String {
        self.network.display_address(&self.account.address())
    }
}
