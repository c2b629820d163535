//! Calldata encoding for the token and batch-disbursement contracts.
//!
//! Calls are built by hand: a 4-byte selector followed by 32-byte ABI
//! words, dynamic arrays appended tail-style after the head. Each selector
//! is the first 4 bytes of keccak256 of the function signature.

use meritdrop_core::Address;

use crate::ChainError;

/// keccak256("decimals()")[0..4]
pub const SEL_DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
/// keccak256("allowance(address,address)")[0..4]
pub const SEL_ALLOWANCE: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];
/// keccak256("approve(address,uint256)")[0..4]
pub const SEL_APPROVE: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];
/// keccak256("bulkDisburse(address,address[],uint256[],uint256)")[0..4]
pub const SEL_BULK_DISBURSE: [u8; 4] = [0x8a, 0x2f, 0x9c, 0x41];

const WORD: usize = 32;

fn word_u128(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_usize(value: usize) -> [u8; WORD] {
    word_u128(value as u128)
}

fn word_address(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

pub fn encode_decimals() -> Vec<u8> {
    SEL_DECIMALS.to_vec()
}

pub fn encode_allowance(owner: &Address, spender: &Address) -> Vec<u8> {
    let mut data = SEL_ALLOWANCE.to_vec();
    data.extend_from_slice(&word_address(owner));
    data.extend_from_slice(&word_address(spender));
    data
}

pub fn encode_approve(spender: &Address, amount: u128) -> Vec<u8> {
    let mut data = SEL_APPROVE.to_vec();
    data.extend_from_slice(&word_address(spender));
    data.extend_from_slice(&word_u128(amount));
    data
}

/// `bulkDisburse(address token, address[] recipients, uint256[] amounts,
/// uint256 totalAmount)` — the two arrays are dynamic, so the head holds
/// their byte offsets and the tails carry `length` plus the elements.
pub fn encode_bulk_disburse(
    token: &Address,
    recipients: &[Address],
    amounts: &[u128],
    total: u128,
) -> Vec<u8> {
    let head_words = 4;
    let recipients_offset = head_words * WORD;
    let amounts_offset = recipients_offset + (1 + recipients.len()) * WORD;

    let mut data = SEL_BULK_DISBURSE.to_vec();
    data.extend_from_slice(&word_address(token));
    data.extend_from_slice(&word_usize(recipients_offset));
    data.extend_from_slice(&word_usize(amounts_offset));
    data.extend_from_slice(&word_u128(total));

    data.extend_from_slice(&word_usize(recipients.len()));
    for recipient in recipients {
        data.extend_from_slice(&word_address(recipient));
    }
    data.extend_from_slice(&word_usize(amounts.len()));
    for amount in amounts {
        data.extend_from_slice(&word_u128(*amount));
    }
    data
}

/// Decode a single uint return word as u8.
pub fn decode_u8(ret: &[u8]) -> Result<u8, ChainError> {
    if ret.len() < WORD || ret[..WORD - 1].iter().any(|&b| b != 0) {
        return Err(ChainError::Decode(format!(
            "expected a uint8 word, got {} bytes",
            ret.len()
        )));
    }
    Ok(ret[WORD - 1])
}

/// Decode a single uint return word as u128, saturating when the value
/// exceeds 128 bits. Unlimited approvals are commonly 2^256-1; saturation
/// preserves every `allowance >= total` comparison we make.
pub fn decode_u128(ret: &[u8]) -> Result<u128, ChainError> {
    if ret.len() < WORD {
        return Err(ChainError::Decode(format!(
            "expected a uint256 word, got {} bytes",
            ret.len()
        )));
    }
    if ret[..WORD - 16].iter().any(|&b| b != 0) {
        return Ok(u128::MAX);
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&ret[WORD - 16..WORD]);
    Ok(u128::from_be_bytes(low))
}

/// 0x-prefixed hex for JSON-RPC payloads.
pub fn to_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Decode a 0x-prefixed hex string from a JSON-RPC response.
pub fn from_hex(data: &str) -> Result<Vec<u8>, ChainError> {
    let stripped = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(stripped).map_err(|e| ChainError::Decode(e.to_string()))
}
